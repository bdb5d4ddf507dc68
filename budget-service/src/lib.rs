pub mod config;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use config::Settings;
use services::{database::Database, email::EmailProvider, insights::InsightsService};
use std::sync::Arc;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub insights: InsightsService,
    pub email: Arc<dyn EmailProvider>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        db: Database,
        insights: InsightsService,
        email: Arc<dyn EmailProvider>,
        settings: Settings,
    ) -> Self {
        Self {
            db,
            insights,
            email,
            settings: Arc::new(settings),
        }
    }
}
