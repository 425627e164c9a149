use billing_common::time::EpochMs;
use tracing::{instrument, warn};

/// Fire-and-forget Stripe meter-events client. Constructed once from
/// `BillingConfig`; absent `stripe_secret_key` disables every call.
pub struct MeterClient {
    client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
}

/// Which payload field carries the event's quantity: app events report
/// `value`, user events report `users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterField {
    Value,
    Users,
}

impl MeterField {
    fn as_str(self) -> &'static str {
        match self {
            MeterField::Value => "value",
            MeterField::Users => "users",
        }
    }
}

impl MeterClient {
    pub fn new(endpoint: impl Into<String>, secret: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into(), secret }
    }

    pub fn enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Emits one meter event. Never returns an error to the caller: network
    /// and vendor failures are logged and swallowed, matching the
    /// fire-and-forget metering contract.
    #[instrument(level = "debug", skip(self))]
    pub async fn send_event(
        &self,
        event_name: &str,
        stripe_customer_id: &str,
        field: MeterField,
        now: EpochMs,
        identifier: &str,
    ) {
        let Some(secret) = self.secret.as_deref() else {
            return;
        };
        let timestamp_secs = (now / 1000).to_string();
        let field_key = format!("payload[{}]", field.as_str());
        let form: [(&str, &str); 5] = [
            ("event_name", event_name),
            ("payload[stripe_customer_id]", stripe_customer_id),
            (&field_key, "1"),
            ("timestamp", &timestamp_secs),
            ("identifier", identifier),
        ];
        let result = self.client.post(&self.endpoint).basic_auth(secret, Some("")).form(&form).send().await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), event_name, "meter event rejected by vendor");
            },
            Err(err) => {
                warn!(error = %err, event_name, "meter event send failed");
            },
            Ok(_) => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_secret() {
        let client = MeterClient::new("https://example.invalid", None);
        assert!(!client.enabled());
    }

    #[test]
    fn enabled_with_secret() {
        let client = MeterClient::new("https://example.invalid", Some("sk_test".into()));
        assert!(client.enabled());
    }

    #[tokio::test]
    async fn send_event_is_a_noop_without_secret() {
        let client = MeterClient::new("https://example.invalid", None);
        // Must not attempt any network call; absence of a panic/hang is the test.
        client.send_event("pay_as_you_go_app", "cus_1", MeterField::Value, 0, "id").await;
    }
}
