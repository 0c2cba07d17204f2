//! LogSink - one summary line per prepared capture

use contracts::{ContractError, DataSink, PresentationFrame};
use tracing::{info, instrument};

pub struct LogSink {
    name: String,
    written: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            written: 0,
        }
    }

    fn log_frame_summary(&self, frame: &PresentationFrame) {
        let channels: Vec<String> = frame.panels.iter().map(|p| p.channel.to_string()).collect();
        let (width, height) = frame.panel_size().unwrap_or((0, 0));

        info!(
            sink = %self.name,
            device_index = frame.device_index,
            serial = %frame.serial,
            frame_seq = frame.sequence,
            channels = ?channels,
            width,
            height,
            registered_ratio = ?frame.registered_ratio,
            "presentation frame"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, frame),
        fields(sink = %self.name, frame_seq = frame.sequence)
    )]
    async fn write(&mut self, frame: &PresentationFrame) -> Result<(), ContractError> {
        self.log_frame_summary(frame);
        self.written += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, frames = self.written, "log sink closed");
        Ok(())
    }
}
