//! # Integration Tests
//!
//! End-to-end scenarios over the mock hardware layer:
//! - Registry and lifecycle contracts
//! - Frame synchronization and buffer hand-back
//! - Normalization and registration boundaries
//! - Full pipeline: devices -> acquisition loops -> dispatcher -> mosaic

#[cfg(test)]
mod registry_tests {
    use std::sync::Arc;

    use contracts::Status;
    use device_manager::{DeviceManager, MockBackend};

    fn manager(serials: &[&str]) -> DeviceManager<MockBackend> {
        DeviceManager::new(Arc::new(MockBackend::with_serials(serials.iter().copied())))
    }

    #[test]
    fn test_two_device_selection_scenario() {
        let mut manager = manager(&["AB12", "CD34"]);
        assert_eq!(manager.refresh().unwrap(), 2);
        assert_eq!(manager.find(0).unwrap().serial, "AB12");
        assert_eq!(manager.find(1).unwrap().serial, "CD34");

        assert!(manager.select(0));
        let selected = manager.selected();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].index, 0);

        assert!(!manager.select(5));
        assert!(manager.deselect(0));
        assert!(manager.selected_list_is_empty());
    }

    #[test]
    fn test_unknown_indices_never_resolve() {
        let mut manager = manager(&["AB12", "CD34"]);
        manager.refresh().unwrap();
        for index in [-1, 2, 3, 100] {
            assert!(manager.find(index).is_none());
            assert!(!manager.select(index));
        }
    }

    #[test]
    fn test_select_is_idempotent() {
        let mut manager = manager(&["AB12", "CD34"]);
        manager.refresh().unwrap();
        assert!(manager.select(1));
        manager.select(1);
        let selected = manager.selected();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].serial, "CD34");
    }

    #[test]
    fn test_clear_selection_always_empties() {
        let mut manager = manager(&["AB12", "CD34"]);
        manager.clear_selection();
        assert!(manager.selected_list_is_empty());

        manager.refresh().unwrap();
        manager.select(0);
        manager.select(1);
        manager.clear_selection();
        assert!(manager.selected_list_is_empty());
    }

    #[test]
    fn test_empty_enumeration() {
        let backend = Arc::new(MockBackend::with_serials(["AB12"]));
        let mut manager = DeviceManager::new(backend.clone());
        manager.refresh().unwrap();
        manager.select(0);

        backend.set_serials(Vec::<String>::new());
        let err = manager.refresh().unwrap_err();
        assert_eq!(err.status(), Status::EmptyData);
        assert!(manager.list().is_empty());
        assert!(manager.selected_list_is_empty());
        assert_eq!(manager.log_devices().unwrap_err().status(), Status::Cancelled);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use contracts::{ChannelSet, DeviceState, Status, StatusExt};
    use device_manager::{DeviceManager, MockBackend, MockConfig};

    fn opened_manager(serials: &[&str]) -> (Arc<MockBackend>, DeviceManager<MockBackend>) {
        let backend = Arc::new(MockBackend::with_serials(serials.iter().copied()));
        let mut manager = DeviceManager::new(backend.clone());
        manager.refresh().unwrap();
        (backend, manager)
    }

    #[test]
    fn test_start_from_closed_is_conflict() {
        let (_, mut manager) = opened_manager(&["AB12"]);
        let err = manager.start_streaming(0, ChannelSet::ALL).unwrap_err();
        assert_eq!(err.status(), Status::Conflict);
        assert_eq!(manager.state(0).unwrap(), DeviceState::Closed);
    }

    #[test]
    fn test_open_close_round_trip() {
        let (backend, mut manager) = opened_manager(&["AB12"]);
        let before = manager.find(0).unwrap();
        assert!(!before.is_open());

        manager.open(0).unwrap();
        assert!(manager.find(0).unwrap().is_open());
        assert_eq!(manager.state(0).unwrap(), DeviceState::Opened);

        manager.close(0).unwrap();
        let after = manager.find(0).unwrap();
        assert_eq!(after, before);
        assert!(after.native_handle.is_none());
        assert_eq!(backend.open_count(), 0);
    }

    #[test]
    fn test_open_errors() {
        let config = MockConfig {
            serials: vec!["AB12".into(), "CD34".into(), "EF56".into()],
            deny_serials: vec!["CD34".into()],
            ..Default::default()
        };
        let backend = Arc::new(MockBackend::with_config(config));
        let mut manager = DeviceManager::new(backend.clone());
        manager.refresh().unwrap();

        manager.open(0).unwrap();
        assert_eq!(manager.open(0).status(), Status::Conflict);

        assert_eq!(manager.open(1).status(), Status::PermissionDenied);
        assert_eq!(manager.state(1).unwrap(), DeviceState::Closed);

        backend.set_serials(["AB12", "CD34"]);
        assert_eq!(manager.open(2).status(), Status::NotFound);
    }

    #[test]
    fn test_streaming_transitions() {
        let (backend, mut manager) = opened_manager(&["AB12"]);
        manager.open(0).unwrap();
        assert_eq!(
            manager.start_streaming(0, ChannelSet::EMPTY).status(),
            Status::InvalidParam
        );

        // stop from Opened is a no-op
        assert_eq!(manager.stop_streaming(0).status(), Status::Success);
        assert_eq!(manager.state(0).unwrap(), DeviceState::Opened);

        manager.start_streaming(0, ChannelSet::ALL).unwrap();
        assert_eq!(manager.state(0).unwrap(), DeviceState::Streaming);
        assert_eq!(backend.streaming_count(), 1);

        manager.close(0).unwrap();
        assert_eq!(manager.state(0).unwrap(), DeviceState::Closed);
        assert_eq!(backend.streaming_count(), 0);
        assert_eq!(backend.open_count(), 0);
    }

    #[test]
    fn test_wait_without_streaming_fails_fast() {
        let (_, mut manager) = opened_manager(&["AB12"]);
        let started = Instant::now();
        assert_eq!(
            manager.wait_for_frame_set(0, Duration::from_secs(10)).status(),
            Status::Conflict
        );

        manager.open(0).unwrap();
        assert_eq!(
            manager.wait_for_frame_set(0, Duration::from_secs(10)).status(),
            Status::Conflict
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_drop_releases_handles() {
        let (backend, mut manager) = opened_manager(&["AB12", "CD34"]);
        manager.open(0).unwrap();
        manager.open(1).unwrap();
        manager.start_streaming(1, ChannelSet::ALL).unwrap();
        assert_eq!(backend.open_count(), 2);

        drop(manager);
        assert_eq!(backend.open_count(), 0);
        assert_eq!(backend.streaming_count(), 0);
    }

    #[test]
    fn test_streamed_frame_set_is_complete() {
        let config = MockConfig {
            serials: vec!["AB12".into()],
            frame_rate_hz: 60.0,
            ..Default::default()
        };
        let mut manager = DeviceManager::new(Arc::new(MockBackend::with_config(config)));
        manager.refresh().unwrap();
        manager.open(0).unwrap();
        let synchronizer = manager.start_streaming(0, ChannelSet::ALL).unwrap();

        let set = synchronizer.wait_for_frame_set(Duration::from_secs(2)).unwrap();
        assert!(set.color().is_some());
        assert!(set.depth().is_some());
        assert!(set.infrared().is_some());
        synchronizer.release(set);

        manager.stop_streaming(0).unwrap();
        assert_eq!(
            synchronizer.wait_for_frame_set(Duration::from_millis(50)).status(),
            Status::Conflict
        );
    }
}

#[cfg(test)]
mod frame_sync_tests {
    use std::time::Duration;

    use contracts::{Channel, ChannelSet, Frame, FrameListener, Status, StatusExt};
    use frame_sync::SyncMultiFrameListener;

    fn plane(channel: Channel, value: f32) -> Frame {
        Frame::from_f32(channel, 4, 3, &[value; 12])
    }

    #[test]
    fn test_in_flight_frames_are_dropped() {
        let channels = ChannelSet::only(Channel::Depth).with(Channel::Infrared);
        let listener = SyncMultiFrameListener::new(0, channels);

        assert!(listener.on_new_frame(plane(Channel::Depth, 1.0)));
        assert!(listener.on_new_frame(plane(Channel::Infrared, 2.0)));
        let frames = listener.wait_for_new_frame(Duration::from_millis(100)).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(listener.is_in_flight());

        assert!(!listener.on_new_frame(plane(Channel::Depth, 3.0)));
        assert_eq!(listener.dropped_frames(), 1);

        listener.release(frames);
        assert!(listener.on_new_frame(plane(Channel::Depth, 4.0)));
        assert!(listener.on_new_frame(plane(Channel::Infrared, 5.0)));
        let frames = listener.wait_for_new_frame(Duration::from_millis(100)).unwrap();
        assert_eq!(frames[0].sample(0), 4.0);
        listener.release(frames);
    }

    #[test]
    fn test_incomplete_set_times_out() {
        let listener = SyncMultiFrameListener::new(0, ChannelSet::ALL);
        listener.on_new_frame(plane(Channel::Depth, 1.0));
        assert_eq!(
            listener.wait_for_new_frame(Duration::from_millis(20)).status(),
            Status::Timeout
        );
    }

    #[test]
    fn test_deactivated_listener_rejects() {
        let listener = SyncMultiFrameListener::new(0, ChannelSet::only(Channel::Depth));
        listener.deactivate();
        assert!(!listener.on_new_frame(plane(Channel::Depth, 1.0)));
        assert_eq!(
            listener.wait_for_new_frame(Duration::from_secs(10)).status(),
            Status::Conflict
        );
    }
}

#[cfg(test)]
mod processing_tests {
    use contracts::{
        Channel, ColorCameraParams, Frame, FrameFormat, IrCameraParams, DEPTH_HEIGHT, DEPTH_WIDTH,
    };
    use processing::{normalize_depth, normalize_infrared, Registration};

    #[test]
    fn test_zero_buffers_normalize_to_black() {
        let zeros = Frame::from_f32(Channel::Depth, 8, 6, &[0.0; 48]);
        assert!(normalize_depth(&zeros).pixels().all(|p| p.0[0] == 0));

        let zeros = Frame::from_f32(Channel::Infrared, 8, 6, &[0.0; 48]);
        assert!(normalize_infrared(&zeros).pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_normalization_ranges() {
        let depth = Frame::from_f32(Channel::Depth, 2, 1, &[9000.0, 2250.0]);
        let image = normalize_depth(&depth);
        assert_eq!(image.get_pixel(0, 0).0[0], 255);
        assert!((126..=128).contains(&image.get_pixel(1, 0).0[0]));

        let ir = Frame::from_f32(Channel::Infrared, 2, 1, &[300.0, 600.0]);
        let image = normalize_infrared(&ir);
        assert_eq!(image.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn test_malformed_registration_input_is_zero_filled() {
        let registration = Registration::new(IrCameraParams::default(), ColorCameraParams::default());
        let color = Frame::new(Channel::Color, 0, 0, FrameFormat::Bgrx, Default::default());
        let depth = Frame::from_f32(Channel::Depth, 3, 3, &[1000.0; 9]);

        let pair = registration.apply(&color, &depth);
        assert_eq!((pair.undistorted.width, pair.undistorted.height), (DEPTH_WIDTH, DEPTH_HEIGHT));
        assert_eq!(
            (pair.registered_color.width, pair.registered_color.height),
            (DEPTH_WIDTH, DEPTH_HEIGHT)
        );
        assert!(pair.undistorted.data.iter().all(|b| *b == 0));
        assert!(pair.registered_color.data.iter().all(|b| *b == 0));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use acquisition::{AcquisitionLoop, CancelToken, LoopSettings, StopReason};
    use contracts::{ChannelSet, PresentationFrame, SinkConfig, SinkType, VisionConfig};
    use device_manager::{DeviceManager, MockBackend, MockConfig};
    use dispatcher::create_dispatcher;
    use processing::PanelSize;
    use tokio::sync::mpsc;

    const PANEL: PanelSize = PanelSize {
        width: 32,
        height: 24,
    };

    fn sinks() -> Vec<SinkConfig> {
        vec![
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 16,
            },
            SinkConfig {
                name: "screen".to_string(),
                sink_type: SinkType::Mosaic,
                queue_capacity: 16,
            },
        ]
    }

    /// Two mock devices -> acquisition loops -> dispatcher -> mosaic board
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_mock_pipeline() {
        let backend = Arc::new(MockBackend::with_config(MockConfig {
            serials: vec!["AB12".into(), "CD34".into()],
            frame_rate_hz: 100.0,
            ..Default::default()
        }));
        let mut manager = DeviceManager::new(backend.clone());
        manager.refresh().unwrap();
        for index in 0..2 {
            assert!(manager.select(index));
            manager.open(index).unwrap();
            manager.start_streaming(index, ChannelSet::ALL).unwrap();
        }
        let manager = manager.into_shared();

        let (tx, rx) = mpsc::channel::<PresentationFrame>(32);
        let dispatcher = create_dispatcher(sinks(), PANEL, rx).unwrap();
        let board = dispatcher.mosaic_board("screen").unwrap();
        let dispatcher_handle = dispatcher.spawn();

        let mut settings = LoopSettings::from_config(&VisionConfig::default());
        settings.frame_timeout = Duration::from_secs(2);
        settings.max_frames = 5;
        settings.panel_size = PANEL;

        let cancel = CancelToken::new();
        let handles: Vec<_> = (0..2)
            .map(|index| {
                AcquisitionLoop::for_device(&manager, index, settings, tx.clone(), cancel.clone())
                    .unwrap()
                    .spawn_blocking()
            })
            .collect();
        drop(tx);

        for handle in handles {
            let stats = tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .expect("acquisition loop timed out")
                .unwrap();
            assert_eq!(stats.frames, 5);
            assert_eq!(stats.stop_reason, StopReason::FrameLimit);
            assert_eq!(stats.metrics.summary().devices[0].frame_sets, 5);
        }

        let sink_metrics = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .expect("dispatcher did not drain")
            .unwrap();
        assert_eq!(sink_metrics.len(), 2);

        {
            let board = board.borrow();
            assert_eq!(board.len(), 2);
            assert_eq!(board[&0].serial, "AB12");
            assert_eq!(board[&1].serial, "CD34");
            assert_eq!(board[&0].image.dimensions(), (PANEL.width * 2, PANEL.height * 2));

            // every capture is accounted once per sink and device
            for (name, report) in &sink_metrics {
                for device in 0..2 {
                    let counts = report.devices[&device];
                    assert_eq!(counts.offered(), 5, "sink {name}");
                    assert_eq!(counts.dropped, 0, "sink {name}");
                }
            }
            let (_, screen) = sink_metrics
                .iter()
                .find(|(name, _)| name == "screen")
                .unwrap();
            assert_eq!(screen.devices[&1].last_sequence, Some(board[&1].sequence));
        }

        manager.lock().unwrap().close_all();
        assert_eq!(backend.open_count(), 0);
    }

    /// A channel that never arrives: every wait times out, no output, device keeps streaming
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeouts_produce_no_output() {
        let backend = Arc::new(MockBackend::with_config(MockConfig {
            serials: vec!["AB12".into()],
            never_deliver: ChannelSet::only(contracts::Channel::Infrared),
            ..Default::default()
        }));
        let mut manager = DeviceManager::new(backend.clone());
        manager.refresh().unwrap();
        manager.open(0).unwrap();
        manager.start_streaming(0, ChannelSet::ALL).unwrap();
        let manager = manager.into_shared();

        let (tx, mut rx) = mpsc::channel::<PresentationFrame>(4);
        let settings = LoopSettings {
            frame_timeout: Duration::from_millis(30),
            ..LoopSettings::default()
        };
        let cancel = CancelToken::new();
        let handle = AcquisitionLoop::for_device(&manager, 0, settings, tx, cancel.clone())
            .unwrap()
            .spawn_blocking();

        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.frames, 0);
        assert!(stats.timeouts >= 1);
        assert_eq!(stats.stop_reason, StopReason::Cancelled);
        assert!(rx.try_recv().is_err());
        assert_eq!(
            manager.lock().unwrap().state(0).unwrap(),
            contracts::DeviceState::Streaming
        );
    }

    #[test]
    fn test_config_round_trip_drives_backend() {
        let toml = r#"
            [backend]
            serials = ["AB12", "CD34"]
            deny_serials = ["CD34"]

            [streaming]
            channels = ["depth", "infrared"]

            [registration]
            enabled = false
        "#;
        let config = config_loader::ConfigLoader::load_from_str(toml, config_loader::ConfigFormat::Toml)
            .unwrap();
        let mut manager =
            DeviceManager::new(Arc::new(MockBackend::with_config(MockConfig::from(&config.backend))));
        assert_eq!(manager.refresh().unwrap(), 2);
        manager.open(0).unwrap();
        assert_eq!(
            manager.open(1).unwrap_err().status(),
            contracts::Status::PermissionDenied
        );
        let synchronizer = manager.start_streaming(0, config.streaming.channels).unwrap();
        assert_eq!(synchronizer.channels(), config.streaming.channels);
    }
}
