//! # Booking API
//!
//! Typed access to the vaccination booking backend.
//!
//! [`ApiClient`] turns a path and an [`Access`] level into one logical
//! request, routing authenticated calls through
//! [`core_auth::AuthenticatedExecutor`]. The domain modules wrap it:
//!
//! - [`vaccine`] - catalog listing, filtering and pricing
//! - [`campaign`] - vaccination campaigns
//! - [`schedule`] - bookings, which also carry payment state
//! - [`profile`] - patient and doctor profiles
//! - [`review`] - vaccine reviews
//! - [`account`] - registration, activation and password flows
//! - [`payment`] - pending payment record and confirmation
//!
//! Every failure surfaces as [`ApiError`], which keeps the server's field
//! errors apart from a single banner message.

pub mod account;
pub mod campaign;
pub mod client;
pub mod de;
pub mod error;
pub mod payment;
pub mod profile;
pub mod review;
pub mod schedule;
pub mod vaccine;

pub use account::{registration_error_message, AccountApi, NewUser, User};
pub use campaign::{Campaign, CampaignApi, NewCampaign};
pub use client::{Access, ApiClient};
pub use de::Related;
pub use error::{ApiError, Result};
pub use payment::{completed_from_redirect, CompletedPayment, PaymentApi, PaymentReceipt, PendingPayment};
pub use profile::{DoctorProfile, DoctorProfileApi, PatientProfile, PatientProfileApi, PatientProfileDraft};
pub use review::{NewReview, Review, ReviewApi};
pub use schedule::{CreatedSchedule, NewSchedule, Schedule, ScheduleApi};
pub use vaccine::{price_of, NewVaccine, Vaccine, VaccineApi, VaccinePage, VaccineQuery};
