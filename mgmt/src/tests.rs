// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use driver::mock::{MockConfig, MockOpener};
    use interface_manager::{
        InterfaceManager, ManagerError, RelayConfigBuilder, RelayMode, RelayState,
        ShutdownToken, SlotIndex, SlotPhase,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::{
        CommandHandler, ControlListener, Disconnect, Frame, FrameWriter, ListenerError,
        serve_client,
    };

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Start(u32, RelayMode),
        Attach(u32, bool),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    impl CommandHandler for Recorder {
        fn ensure_started(&self, index: SlotIndex, mode: RelayMode) -> Result<(), ManagerError> {
            self.calls.lock().push(Call::Start(index.as_u32(), mode));
            Ok(())
        }
        fn set_attached(&self, index: SlotIndex, attached: bool) -> Result<(), ManagerError> {
            self.calls.lock().push(Call::Attach(index.as_u32(), attached));
            Ok(())
        }
    }

    fn send(stream: &UnixStream, frames: &[Frame]) {
        let mut writer = FrameWriter::new(stream);
        for frame in frames {
            writer.write_frame(*frame).unwrap();
        }
    }

    fn socket_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ringbus-{}-{name}.sock", std::process::id()))
    }

    #[test]
    #[traced_test]
    fn frames_map_to_handler_calls() {
        let (client, server) = UnixStream::pair().unwrap();
        send(
            &client,
            &[
                Frame::new(3, 3),
                Frame::new(3, 11),
                Frame::new(0, 5),
                Frame::new(-2, 11),
                Frame::new(3, 7),
                Frame::new(3, 10),
            ],
        );
        drop(client);

        let recorder = Recorder::default();
        let end = serve_client(server, &recorder, &ShutdownToken::new());
        assert_eq!(end, Disconnect::Closed);
        assert_eq!(
            recorder.calls(),
            vec![
                Call::Start(3, RelayMode::Bidirectional),
                Call::Attach(3, true),
                Call::Attach(3, false),
            ]
        );
    }

    #[test]
    #[traced_test]
    fn malformed_frame_drops_connection() {
        let (mut client, server) = UnixStream::pair().unwrap();
        send(&client, &[Frame::new(2, 1)]);
        client.write_all(&[1, 2, 3]).unwrap();
        drop(client);

        let recorder = Recorder::default();
        let end = serve_client(server, &recorder, &ShutdownToken::new());
        assert_eq!(end, Disconnect::Dropped);
        assert_eq!(recorder.calls(), vec![Call::Start(2, RelayMode::ReceiveOnly)]);
        assert!(logs_contain("Truncated frame"));
    }

    #[test]
    fn idle_connection_observes_shutdown() {
        let (client, server) = UnixStream::pair().unwrap();
        let shutdown = ShutdownToken::new();
        let server_shutdown = shutdown.clone();
        let server = std::thread::spawn(move || {
            serve_client(server, &Recorder::default(), &server_shutdown)
        });
        std::thread::sleep(Duration::from_millis(50));
        shutdown.request();
        assert_eq!(server.join().unwrap(), Disconnect::Shutdown);
        drop(client);
    }

    #[test]
    #[traced_test]
    fn protocol_drives_the_manager() {
        let config = RelayConfigBuilder::default()
            .poll_timeout(Duration::from_millis(10))
            .phy_reset_wait(Duration::ZERO)
            .build()
            .unwrap();
        let manager =
            InterfaceManager::new(RelayState::new(config), MockOpener::new(MockConfig::default()));
        let index = SlotIndex(3);

        let (client, server) = UnixStream::pair().unwrap();
        send(&client, &[Frame::new(3, 3), Frame::new(3, 11), Frame::new(1001, 1)]);
        drop(client);
        assert_eq!(
            serve_client(server, &manager, &ShutdownToken::new()),
            Disconnect::Closed
        );
        let status = manager.status(index).unwrap();
        assert_eq!(status.phase, SlotPhase::Active);
        assert_eq!(status.mode, Some(RelayMode::Bidirectional));
        assert!(status.attached);
        assert!(logs_contain("Invalid interface index 1001"));
        assert_eq!(manager.statuses().len(), 1);

        let (client, server) = UnixStream::pair().unwrap();
        send(&client, &[Frame::new(3, 10)]);
        drop(client);
        serve_client(server, &manager, &ShutdownToken::new());
        assert_eq!(manager.status(index).unwrap().phase, SlotPhase::PendingReap);

        let start = Instant::now();
        while manager.status(index).unwrap().phase != SlotPhase::Unused {
            assert!(start.elapsed() < Duration::from_secs(5), "slot never reaped");
            manager.reap();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(manager.opener().transport("eth3").unwrap().is_closed());
    }

    #[test]
    #[traced_test]
    fn listener_serves_clients_in_turn() {
        let path = socket_path("listener");
        let listener = ControlListener::bind(&path).unwrap();
        let recorder = Arc::new(Recorder::default());
        let shutdown = ShutdownToken::new();
        let handle = listener.spawn(recorder.clone(), shutdown.clone()).unwrap();

        for i in 1..=2 {
            let client = UnixStream::connect(&path).unwrap();
            send(&client, &[Frame::attach(i, true)]);
        }

        let start = Instant::now();
        while recorder.calls().len() < 2 {
            assert!(start.elapsed() < Duration::from_secs(5), "frames not served");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            recorder.calls(),
            vec![Call::Attach(1, true), Call::Attach(2, true)]
        );

        shutdown.request();
        handle.join().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn bind_replaces_stale_socket() {
        let path = socket_path("stale");
        std::fs::write(&path, b"stale").unwrap();
        let listener = ControlListener::bind(&path).unwrap();
        assert_eq!(listener.path(), path.as_path());
        drop(listener);
        assert!(!path.exists());
    }

    #[test]
    fn bind_reports_the_failing_directory() {
        let blocker = socket_path("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let Err(err) = ControlListener::bind(&blocker.join("control.sock")) else {
            panic!("bound below a regular file");
        };
        assert!(matches!(err, ListenerError::Directory(ref dir, _) if *dir == blocker));
        assert!(err.to_string().contains(&blocker.display().to_string()));
        std::fs::remove_file(&blocker).unwrap();
    }
}
