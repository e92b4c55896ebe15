use std::sync::Arc;

use voya_booking::BookingManager;
use voya_domain::DepartureRepository;
use voya_gateway::ReconciliationGateway;
use voya_ledger::SlotLedger;
use voya_store::app_config::BusinessRules;

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingManager>,
    pub gateway: Arc<ReconciliationGateway>,
    pub departures: Arc<dyn DepartureRepository>,
    pub ledger: Arc<dyn SlotLedger>,
    pub business_rules: BusinessRules,
}
