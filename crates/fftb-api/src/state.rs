//! Application state.

use std::sync::Arc;

use fftb_dealer::{Contracter, ContracterConfig, LocalDealer};
use fftb_media::MediaEngine;
use fftb_registry::Registry;
use fftb_storage::{StorageClient, StorageController};

use crate::auth::TokenIssuer;
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub registry: Registry,
    pub dealer: Arc<LocalDealer>,
    pub contracter: Arc<Contracter>,
    pub tokens: Arc<TokenIssuer>,
}

impl AppState {
    /// Wire the dealer and contracter over already-built backends.
    pub fn new(
        config: ApiConfig,
        registry: Registry,
        storage: Arc<dyn StorageController>,
        client: Arc<dyn StorageClient>,
        engine: Arc<dyn MediaEngine>,
        contracter_config: ContracterConfig,
    ) -> Self {
        let dealer = Arc::new(LocalDealer::new(registry.clone(), storage));
        let contracter = Arc::new(Contracter::new(
            dealer.clone(),
            registry.clone(),
            engine,
            client,
            contracter_config,
        ));
        let tokens = Arc::new(TokenIssuer::new(
            &config.authority_secret,
            &config.session_secret,
            config.session_ttl,
        ));

        Self {
            config,
            registry,
            dealer,
            contracter,
            tokens,
        }
    }
}
