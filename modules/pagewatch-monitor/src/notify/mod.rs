mod backend;
mod fanout;
mod file;
mod noop;
mod resend;
mod slack;

pub use backend::NotifyBackend;
pub use fanout::NotifyFanout;
pub use file::FileDigest;
pub use noop::NoopBackend;
pub use resend::ResendEmail;
pub use slack::SlackWebhook;

use pagewatch_common::{AppConfig, FileConfig, Rating};
use tracing::info;

/// Build the fan-out from whichever channels are configured.
pub fn from_config(app: &AppConfig, file: &FileConfig) -> anyhow::Result<NotifyFanout> {
    let min_rating = Rating::new(i64::from(file.notify.min_rating))?;
    let mut fanout = NotifyFanout::new();

    if let Some(url) = &app.slack_webhook_url {
        fanout = fanout.with("slack", Box::new(SlackWebhook::new(url.clone(), min_rating)));
    }
    if let (Some(key), Some(from)) = (&app.resend_api_key, &app.notify_email_from) {
        if !app.notify_email_to.is_empty() {
            fanout = fanout.with(
                "resend",
                Box::new(ResendEmail::new(
                    key.clone(),
                    from.clone(),
                    app.notify_email_to.clone(),
                    min_rating,
                )),
            );
        }
    }
    if let Some(dir) = &file.notify.summary_dir {
        fanout = fanout.with("file", Box::new(FileDigest::new(dir, min_rating)));
    }

    info!(backends = fanout.len(), min_rating = %min_rating, "Notifications configured");
    Ok(fanout)
}
