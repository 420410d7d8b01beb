use std::sync::Arc;

use gatehouse_core_types::Token;
use gatehouse_event_bus::{Envelope, LogHandle};
use tracing::{error, warn};

use crate::error::StageError;
use crate::model::{AuditErrorEvent, DataRequest};

/// Publishes one service's failures to the shared error topic.
#[derive(Clone)]
pub struct AuditReporter {
    service_name: Arc<str>,
    errors: LogHandle<AuditErrorEvent>,
}

impl AuditReporter {
    pub fn new(service_name: &str, errors: LogHandle<AuditErrorEvent>) -> Self {
        Self {
            service_name: Arc::from(service_name),
            errors,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub async fn report(&self, token: &Token, request: Option<&DataRequest>, cause: &StageError) {
        let mut event = AuditErrorEvent::new(token.clone(), &*self.service_name, cause.clone());
        if let Some(request) = request {
            event = event.with_request(request);
        }
        self.publish(event).await;
    }

    pub async fn publish(&self, event: AuditErrorEvent) {
        warn!(
            token = %event.token,
            service = %event.service_name,
            error = %event.error,
            "request failed"
        );
        let token = event.token.clone();
        if let Err(err) = self.errors.publish(Envelope::message(token, event)).await {
            error!(%err, "audit error event dropped");
        }
    }
}
