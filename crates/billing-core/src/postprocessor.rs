use billing_common::{config::BillingConfig, time::EpochMs, Billing, Warning};
use serde_json::{json, Value};

/// Pure response transform run once the handler has already produced its
/// response body. Never suspends, never fails: a missing or malformed
/// response is passed through unchanged.
pub struct PostprocessOutcome {
    pub response: Value,
    pub claim_issue_header: bool,
}

fn grace_warning(billing: &Billing, now: EpochMs) -> Option<Warning> {
    if let Some(permission) = &billing.permission {
        if let Some(warning) = permission.warning() {
            return Some(warning.clone());
        }
    }
    let app = billing.app.as_ref()?;
    if app.is_orphan() && now < app.free_until {
        return Some(Warning::app_grace_period(app.free_until - now));
    }
    None
}

/// Shallow-merges a `warning` field into a response. `None` (the handler
/// produced no body at all) wraps to `{ warning }`; a present `Value::Object`
/// gets `warning` merged in; every other present shape — including an
/// explicit `null` — has no slot for the field and passes through unchanged.
fn merge_warning(response: Option<Value>, warning: Warning) -> Value {
    let warning = serde_json::to_value(&warning).unwrap_or(Value::Null);
    match response {
        None => json!({ "warning": warning }),
        Some(Value::Object(mut map)) => {
            map.insert("warning".to_string(), warning);
            Value::Object(map)
        },
        Some(other) => other,
    }
}

/// Runs after a `Billing`-flagged handler returns successfully. Skipped
/// entirely in private-backend mode or when preprocessing never bound a
/// `Billing` record (handler without the flag, or a fail-open preprocessor
/// outcome). `response` is `None` when the handler produced no body;
/// `Some(Value::Null)` is a handler-chosen explicit null and is distinct
/// from it.
pub fn postprocess(billing: Option<&Billing>, config: &BillingConfig, now: EpochMs, response: Option<Value>) -> PostprocessOutcome {
    let Some(billing) = billing else {
        return PostprocessOutcome { response: response.unwrap_or(Value::Null), claim_issue_header: false };
    };
    if config.private_backend {
        return PostprocessOutcome { response: response.unwrap_or(Value::Null), claim_issue_header: false };
    }

    let response = match grace_warning(billing, now) {
        Some(warning) => merge_warning(response, warning),
        None => response.unwrap_or(Value::Null),
    };
    PostprocessOutcome { response, claim_issue_header: billing.claim_issue }
}
