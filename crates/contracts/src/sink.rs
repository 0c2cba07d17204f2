//! DataSink trait - presentation output interface
//!
//! Sinks receive prepared captures from the dispatcher, one worker task per
//! sink, so a slow or failing sink never stalls acquisition.

use crate::{ContractError, PresentationFrame};

/// Presentation sink
///
/// `DataSink` is the `Send` variant used by the dispatcher workers.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Name used in logs and metrics
    fn name(&self) -> &str;

    /// Only the newest capture of each device matters to this sink.
    ///
    /// The worker then skips queued captures already overtaken by a newer
    /// one from the same device.
    fn latest_only(&self) -> bool {
        false
    }

    /// Consume one prepared capture
    ///
    /// # Errors
    /// `SinkWrite` with the sink name; the worker logs it and keeps going.
    async fn write(&mut self, frame: &PresentationFrame) -> Result<(), ContractError>;

    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Called once when the dispatcher shuts down
    async fn close(&mut self) -> Result<(), ContractError>;
}
