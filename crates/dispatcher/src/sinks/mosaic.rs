//! MosaicSink - 2x2 mosaic per device, published on a watch channel
//!
//! The sink owns no window: an embedding UI subscribes and renders the
//! latest mosaic of each device.

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{ContractError, DataSink, DeviceIndex, PresentationFrame};
use image::RgbImage;
use processing::{compose_mosaic, PanelSize};
use tokio::sync::watch;
use tracing::{debug, instrument};

/// Composed mosaic of one capture
#[derive(Debug, Clone)]
pub struct Mosaic {
    pub device_index: DeviceIndex,
    pub serial: String,
    pub sequence: u64,
    pub image: RgbImage,
}

/// Latest mosaic per device
pub type MosaicBoard = BTreeMap<DeviceIndex, Arc<Mosaic>>;

pub struct MosaicSink {
    name: String,
    panel_size: PanelSize,
    board: watch::Sender<MosaicBoard>,
}

impl MosaicSink {
    /// `panel_size` is used when a frame carries no panels
    pub fn new(name: impl Into<String>, panel_size: PanelSize) -> Self {
        let (board, _) = watch::channel(MosaicBoard::new());
        Self {
            name: name.into(),
            panel_size,
            board,
        }
    }

    /// Receiver of the board; sees every later update
    pub fn subscribe(&self) -> watch::Receiver<MosaicBoard> {
        self.board.subscribe()
    }
}

impl DataSink for MosaicSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn latest_only(&self) -> bool {
        true
    }

    #[instrument(
        name = "mosaic_sink_write",
        skip(self, frame),
        fields(sink = %self.name, device_index = frame.device_index, frame_seq = frame.sequence)
    )]
    async fn write(&mut self, frame: &PresentationFrame) -> Result<(), ContractError> {
        let mosaic = Arc::new(Mosaic {
            device_index: frame.device_index,
            serial: frame.serial.clone(),
            sequence: frame.sequence,
            image: compose_mosaic(frame, self.panel_size),
        });
        // published even without subscribers, a late subscriber sees the latest board
        self.board.send_modify(|board| {
            board.insert(frame.device_index, mosaic);
        });
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(
            sink = %self.name,
            devices = self.board.borrow().len(),
            "mosaic sink closed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::tests::presentation;

    #[tokio::test]
    async fn test_mosaic_published_per_device() {
        let mut sink = MosaicSink::new("mosaic", PanelSize::default());
        let mut rx = sink.subscribe();

        sink.write(&presentation(0, 1)).await.unwrap();
        sink.write(&presentation(1, 1)).await.unwrap();
        sink.write(&presentation(0, 2)).await.unwrap();

        assert!(rx.has_changed().unwrap());
        let board = rx.borrow_and_update();
        assert_eq!(board.len(), 2);
        assert_eq!(board[&0].sequence, 2);
        assert_eq!(board[&1].serial, "SN1");
        // panels are 4x3 in the helper frame
        assert_eq!(board[&0].image.dimensions(), (8, 6));
    }

    #[tokio::test]
    async fn test_empty_frame_uses_fallback_size() {
        let mut sink = MosaicSink::new("mosaic", PanelSize { width: 2, height: 2 });
        let rx = sink.subscribe();
        let mut frame = presentation(3, 9);
        frame.panels.clear();

        sink.write(&frame).await.unwrap();
        let board = rx.borrow();
        assert_eq!(board[&3].image.dimensions(), (4, 4));
        assert!(board[&3].image.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
