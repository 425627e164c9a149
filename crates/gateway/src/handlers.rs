use async_trait::async_trait;
use billing_common::Billing;
use serde_json::{json, Value};

/// A business handler, invoked between the Preprocessor and Postprocessor
/// with the request's resolved `Billing` record (`None` for handlers that
/// don't run billing at all). Standing in for the real product's endpoint
/// logic, which is out of scope here. `None` means no body at all (the
/// Postprocessor wraps it into `{ warning }`); `Some(Value::Null)` is a
/// handler-chosen explicit null and passes through unchanged.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, billing: Option<&Billing>) -> Option<Value>;
}

/// A `Security`-flagged handler: reachable only once Enforcement has
/// allowed the request.
pub struct Authorize;

#[async_trait]
impl Handler for Authorize {
    async fn handle(&self, billing: Option<&Billing>) -> Option<Value> {
        Some(json!({
            "authorized": true,
            "organizationId": billing.and_then(Billing::organization_id),
            "appId": billing.and_then(Billing::app_id),
        }))
    }
}

/// A `Logging`-flagged handler with no enforcement: always runs, regardless
/// of permission, so downstream systems can stay reconciled with this
/// service's view of apps and organizations.
pub struct SyncIds;

#[async_trait]
impl Handler for SyncIds {
    async fn handle(&self, billing: Option<&Billing>) -> Option<Value> {
        Some(json!({
            "appId": billing.and_then(Billing::app_id),
            "organizationId": billing.and_then(Billing::organization_id),
        }))
    }
}

#[cfg(test)]
mod tests {
    use billing_common::App;

    use super::*;

    #[tokio::test]
    async fn authorize_reports_resolved_identifiers() {
        let mut billing = Billing::new();
        billing.app = Some(App {
            id: "a1".into(),
            name: "a1".into(),
            publisher: "acme".into(),
            created: 0,
            free_until: 0,
            owner: None,
            git_email: None,
            sponsored: false,
        });
        let body = Authorize.handle(Some(&billing)).await.unwrap();
        assert_eq!(body["appId"], "a1");
        assert_eq!(body["organizationId"], Value::Null);
    }

    #[tokio::test]
    async fn sync_ids_handles_absent_billing() {
        let body = SyncIds.handle(None).await.unwrap();
        assert_eq!(body["appId"], Value::Null);
    }
}
