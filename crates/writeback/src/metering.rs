use std::sync::{Arc, Mutex};

use billing_common::{time::month_key, BillingLog, Organization, RecordOutcome};
use billing_store::{Blob, ObjectStore};
use tracing::instrument;

use crate::meter_client::{MeterClient, MeterField};

/// PAYG usage recording for one `(orgId, appId, publisher, gitEmail)` tuple,
/// gated on the organization being metered (`plan = "payg"` with a Stripe
/// customer id).
#[instrument(level = "debug", skip(store, meter, org))]
pub async fn record_usage(
    store: Arc<dyn ObjectStore>,
    meter: &MeterClient,
    org: &Organization,
    app_id: &str,
    publisher: &str,
    git_email: Option<&str>,
    now: i64,
) {
    if !org.is_payg_metered() {
        return;
    }
    let Some(customer_id) = org.stripe_customer_id.as_deref() else { return };
    let month = month_key(now);
    let blob: Blob<BillingLog> = Blob::new(store, format!("logs://{}_billingLog.json", org.id));

    let app_id_owned = app_id.to_string();
    let publisher_owned = publisher.to_string();
    let month_for_mutator = month.clone();
    // Overwritten on every mutator invocation; only the outcome from the
    // attempt that actually commits survives past `optimistic_update`.
    let outcomes: Arc<Mutex<(Option<RecordOutcome>, Option<RecordOutcome>)>> = Arc::new(Mutex::new((None, None)));
    let outcomes_for_mutator = outcomes.clone();
    let result = blob
        .optimistic_update(
            move |mut log| {
                let app_outcome = log.record_app(&month_for_mutator, &app_id_owned, &publisher_owned, now);
                let user_outcome = git_email.map(|email| log.record_user(&month_for_mutator, email, now));
                *outcomes_for_mutator.lock().unwrap() = (Some(app_outcome), user_outcome);
                log
            },
            BillingLog::default(),
        )
        .await;
    if result.is_err() {
        return;
    }
    let (app_outcome, user_outcome) = *outcomes.lock().unwrap();

    if app_outcome == Some(RecordOutcome::FirstSeenThisMonth) {
        let app_key = format!("{app_id}|{publisher}");
        let identifier = format!("{}_{}_app_{}", org.id, month, app_key);
        meter.send_event("pay_as_you_go_app", customer_id, MeterField::Value, now, &identifier).await;
    }
    if let (Some(email), Some(RecordOutcome::FirstSeenThisMonth)) = (git_email, user_outcome) {
        let email_key = email.to_lowercase();
        let identifier = format!("{}_{}_user_{}", org.id, month, email_key);
        meter.send_event("pay_as_you_go_user", customer_id, MeterField::Users, now, &identifier).await;
    }
}
