use shared::{
    domain::MessageId,
    protocol::{MessagePayload, NewMessageRequest},
};
use tracing::{info, warn};

use crate::{error::ClientError, transport::ChatApi, types::PendingSend};

#[derive(Debug, Default)]
pub struct QueueReport {
    pub delivered: Vec<(MessageId, MessagePayload)>,
    pub failed: Vec<(MessageId, ClientError)>,
}

/// Posts every queued send in order. A failure is recorded and the drain
/// moves on to the next item.
pub async fn drain(api: &dyn ChatApi, queued: &[PendingSend]) -> QueueReport {
    let mut report = QueueReport::default();
    for pending in queued {
        let request = NewMessageRequest {
            text: pending.text.clone(),
            reply_to: pending.reply_to.clone(),
        };
        match api.create_message(&request).await {
            Ok(confirmed) => {
                info!(
                    temp_id = %pending.temp_id,
                    message_id = %confirmed.uuid,
                    "offline queue: delivered queued message"
                );
                report.delivered.push((pending.temp_id.clone(), confirmed));
            }
            Err(err) => {
                warn!(
                    temp_id = %pending.temp_id,
                    "offline queue: send failed, keeping message queued: {err}"
                );
                report.failed.push((pending.temp_id.clone(), err));
            }
        }
    }
    report
}
