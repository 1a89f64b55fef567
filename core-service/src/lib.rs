//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host-provided bridges carried by [`CoreConfig`]
//! (HTTP, secure storage, clock) into the auth and API crates and hands the
//! host one object to hold. Desktop apps typically enable the
//! `desktop-shims` feature, which fills in the reqwest client and the OS
//! keychain when the host provides neither.
//!
//! ```no_run
//! # async fn example() -> core_service::Result<()> {
//! use core_runtime::CoreConfig;
//! use core_service::CoreService;
//!
//! let core = CoreService::new(CoreConfig::builder().from_env()?.build()?)?;
//! core.auth().login("01712345678", "secret").await?;
//!
//! let vaccines = core.vaccines().list(&Default::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_api::{
    AccountApi, ApiClient, CampaignApi, DoctorProfileApi, PatientProfileApi, PaymentApi,
    ReviewApi, ScheduleApi, VaccineApi,
};
use core_auth::{
    join_url, AuthManager, AuthScheme, AuthenticatedExecutor, RefreshCoordinator, SchemeCache,
    TokenStore,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, Receiver};
use core_runtime::CoreEvent;
use tracing::info;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{MemorySecureStore, ReqwestHttpClient};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    event_bus: EventBus,
    schemes: Arc<SchemeCache>,
    auth: Arc<AuthManager>,
    client: Arc<ApiClient>,
    vaccines: Arc<VaccineApi>,
    campaigns: Arc<CampaignApi>,
    schedules: Arc<ScheduleApi>,
    patient_profiles: Arc<PatientProfileApi>,
    doctor_profiles: Arc<DoctorProfileApi>,
    reviews: Arc<ReviewApi>,
    accounts: Arc<AccountApi>,
    payments: Arc<PaymentApi>,
}

impl CoreService {
    /// Builds every component from a validated configuration.
    ///
    /// Fails only if the configured scheme order names an unknown scheme.
    pub fn new(config: CoreConfig) -> Result<Self> {
        let scheme_order = AuthScheme::parse_order(&config.auth.scheme_order)?;
        let base_url = config.api.base_url.clone();
        let event_bus = EventBus::new(config.event_buffer);

        let token_store = Arc::new(TokenStore::new(
            Arc::clone(&config.secure_store),
            config.auth.credential_key.clone(),
        ));
        let schemes = Arc::new(SchemeCache::new());

        let refresher = Arc::new(RefreshCoordinator::new(
            Arc::clone(&config.http_client),
            Arc::clone(&token_store),
            event_bus.clone(),
            Arc::clone(&config.clock),
            join_url(&base_url, &config.auth.refresh_endpoint),
            config.auth.login_route.clone(),
        ));
        let executor = Arc::new(AuthenticatedExecutor::new(
            Arc::clone(&token_store),
            Arc::clone(&schemes),
            refresher,
            scheme_order,
            event_bus.clone(),
        ));
        let auth = Arc::new(AuthManager::new(
            Arc::clone(&config.http_client),
            token_store,
            Arc::clone(&schemes),
            event_bus.clone(),
            join_url(&base_url, &config.auth.token_endpoint),
        ));

        let client = Arc::new(ApiClient::new(
            Arc::clone(&config.http_client),
            executor,
            base_url,
        ));
        let payments = Arc::new(PaymentApi::new(
            Arc::clone(&client),
            Arc::clone(&config.secure_store),
            Arc::clone(&config.clock),
            event_bus.clone(),
            config.payment.clone(),
        ));

        info!(
            base_url = %config.api.base_url,
            schemes = ?config.auth.scheme_order,
            "Core service initialized"
        );

        Ok(Self {
            vaccines: Arc::new(VaccineApi::new(Arc::clone(&client))),
            campaigns: Arc::new(CampaignApi::new(Arc::clone(&client))),
            schedules: Arc::new(ScheduleApi::new(Arc::clone(&client))),
            patient_profiles: Arc::new(PatientProfileApi::new(Arc::clone(&client))),
            doctor_profiles: Arc::new(DoctorProfileApi::new(Arc::clone(&client))),
            reviews: Arc::new(ReviewApi::new(Arc::clone(&client))),
            accounts: Arc::new(AccountApi::new(Arc::clone(&client))),
            payments,
            client,
            auth,
            schemes,
            event_bus,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Subscribes to session and payment events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// Learned scheme per endpoint prefix.
    pub fn schemes(&self) -> &SchemeCache {
        &self.schemes
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn vaccines(&self) -> &VaccineApi {
        &self.vaccines
    }

    pub fn campaigns(&self) -> &CampaignApi {
        &self.campaigns
    }

    pub fn schedules(&self) -> &ScheduleApi {
        &self.schedules
    }

    pub fn patient_profiles(&self) -> &PatientProfileApi {
        &self.patient_profiles
    }

    pub fn doctor_profiles(&self) -> &DoctorProfileApi {
        &self.doctor_profiles
    }

    pub fn reviews(&self) -> &ReviewApi {
        &self.reviews
    }

    pub fn accounts(&self) -> &AccountApi {
        &self.accounts
    }

    pub fn payments(&self) -> &PaymentApi {
        &self.payments
    }
}

/// Convenience bootstrapper for desktop hosts: environment overrides on top
/// of the defaults, reqwest and the OS keychain as bridges.
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop() -> Result<CoreService> {
    let config = CoreConfig::builder().from_env()?.build()?;
    CoreService::new(config)
}
