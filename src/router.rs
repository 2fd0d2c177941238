//! The reply router (spec §4.2): classifies each assembled batch as an
//! asynchronous event or a command reply, and hands it to the matching
//! consumer.

use crate::dispatcher::Dispatcher;
use crate::err::{Error, Result};
use crate::events::EventRegistry;
use crate::wire::ReplyBatch;

/// Route one assembled batch to the event registry or the command
/// dispatcher, per spec §4.2.
///
/// A non-event batch that arrives with no waiter present is a protocol
/// violation and is surfaced as an error so the caller (the reader loop)
/// can fail the connection.
pub(crate) async fn route(
    batch: ReplyBatch,
    dispatcher: &Dispatcher,
    events: &EventRegistry,
) -> Result<()> {
    if batch.is_event() {
        events.deliver(batch).await;
        Ok(())
    } else if dispatcher.deliver(batch).await {
        Ok(())
    } else {
        Err(Error::parse(
            None::<String>,
            "received a non-event reply with no outstanding command",
        ))
    }
}
