//! Session transport against real loopback sockets.

use std::time::Duration;
use terminal::protocol::{read_frame, write_frame};
use terminal::{Frame, HandleId, SessionEvent, SessionHandle, TermSize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Helpers
// ============================================================================

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn open(slot: usize, port: u16) -> (SessionHandle, mpsc::UnboundedReceiver<(HandleId, SessionEvent)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = SessionHandle::open(slot, port, move |id, event| {
        let _ = tx.send((id, event));
    });
    (handle, rx)
}

async fn next_frame(stream: &mut TcpStream) -> Frame {
    tokio::time::timeout(TIMEOUT, read_frame(stream))
        .await
        .expect("timed out waiting for frame")
        .unwrap()
        .expect("stream closed")
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<(HandleId, SessionEvent)>) -> SessionEvent {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
        .1
}

// ============================================================================
// Session handle
// ============================================================================

mod handle {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn writes_reach_backend_in_order() {
        let (listener, port) = listener().await;
        let (handle, _events) = open(1, port);
        handle.resize(TermSize::new(120, 40));
        handle.write_line("ls -la");
        handle.write("q");
        handle.resend_working_directory();

        let (mut backend, _) = listener.accept().await.unwrap();
        assert_eq!(next_frame(&mut backend).await, Frame::Resize { cols: 120, rows: 40 });
        assert_eq!(next_frame(&mut backend).await, Frame::Data(b"ls -la\r".to_vec()));
        assert_eq!(next_frame(&mut backend).await, Frame::Data(b"q".to_vec()));
        assert_eq!(next_frame(&mut backend).await, Frame::RequestCwd);
    }

    #[tokio::test]
    async fn backend_frames_become_events() {
        let (listener, port) = listener().await;
        let (handle, mut events) = open(2, port);
        let (mut backend, _) = listener.accept().await.unwrap();

        write_frame(&mut backend, &Frame::Data(b"$ ".to_vec())).await.unwrap();
        write_frame(&mut backend, &Frame::ProcessName("vim".into())).await.unwrap();
        write_frame(&mut backend, &Frame::Cwd("/tmp".into())).await.unwrap();

        assert_eq!(next_event(&mut events).await, SessionEvent::Output(b"$ ".to_vec()));
        assert_eq!(next_event(&mut events).await, SessionEvent::ProcessName("vim".into()));
        assert_eq!(next_event(&mut events).await, SessionEvent::Cwd("/tmp".into()));
        drop(handle);
    }

    #[tokio::test]
    async fn closed_fires_once_when_backend_goes_away() {
        let (listener, port) = listener().await;
        let (handle, mut events) = open(3, port);
        let (backend, _) = listener.accept().await.unwrap();
        drop(backend);

        let (id, event) = tokio::time::timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
        assert_eq!(id, handle.id());
        assert_eq!(event, SessionEvent::Closed);

        // The transport task has finished; nothing else arrives.
        assert!(tokio::time::timeout(Duration::from_millis(200), events.recv())
            .await
            .map_or(true, |e| e.is_none()));
        // Writing after the transport closed is a quiet no-op.
        handle.write("ignored");
    }

    #[tokio::test]
    async fn connect_failure_reports_closed() {
        let (listener, port) = listener().await;
        drop(listener);

        let (_handle, mut events) = open(4, port);
        assert_eq!(next_event(&mut events).await, SessionEvent::Closed);
    }

    #[tokio::test]
    async fn dispose_suppresses_close_notice() {
        let (listener, port) = listener().await;
        let (mut handle, mut events) = open(1, port);
        let (backend, _) = listener.accept().await.unwrap();

        handle.dispose();
        drop(backend);

        assert!(handle.is_disposed());
        assert!(tokio::time::timeout(Duration::from_millis(300), events.recv())
            .await
            .map_or(true, |e| e.is_none()));
    }

    #[tokio::test]
    async fn malformed_frame_closes_transport() {
        let (listener, port) = listener().await;
        let (_handle, mut events) = open(1, port);
        let (mut backend, _) = listener.accept().await.unwrap();

        use tokio::io::AsyncWriteExt;
        backend.write_all(&[42, 0, 0, 0, 0]).await.unwrap();

        assert_eq!(next_event(&mut events).await, SessionEvent::Closed);
    }

    #[tokio::test]
    async fn focus_tracks_keyboard_target() {
        let (_listener, port) = listener().await;
        let (mut handle, _events) = open(0, port);
        assert!(!handle.is_focused());
        handle.focus();
        assert!(handle.is_focused());
        handle.blur();
        assert!(!handle.is_focused());
        assert_eq!(handle.slot(), 0);
        assert_eq!(handle.port(), port);
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "after dispose")]
    async fn write_after_dispose_panics_in_debug() {
        let (_listener, port) = listener().await;
        let (mut handle, _events) = open(1, port);
        handle.dispose();
        handle.write("late");
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "resize on session handle")]
    async fn resize_after_dispose_names_the_operation() {
        let (_listener, port) = listener().await;
        let (mut handle, _events) = open(1, port);
        handle.dispose();
        handle.resize(TermSize::new(100, 30));
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "resend_working_directory on session handle")]
    async fn cwd_request_after_dispose_names_the_operation() {
        let (_listener, port) = listener().await;
        let (mut handle, _events) = open(1, port);
        handle.dispose();
        handle.resend_working_directory();
    }
}

// ============================================================================
// Session backend
// ============================================================================

#[cfg(unix)]
mod backend {
    use super::*;
    use pretty_assertions::assert_eq;
    use terminal::{SessionOptions, SessionServer};

    #[tokio::test]
    async fn serves_shell_and_closes_when_it_exits() {
        let options = SessionOptions {
            shell: Some("/bin/sh".into()),
            cwd: Some(std::env::temp_dir()),
            size: TermSize::default(),
            detached_grace: None,
        };
        let server = SessionServer::bind(0, options).await.unwrap();
        let port = server.local_port().unwrap();
        let server = tokio::spawn(server.run());

        let (handle, mut events) = open(1, port);
        handle.resize(TermSize::new(100, 30));
        handle.write_line("echo tabterm-$((40 + 2))");
        handle.write_line("exit");

        let mut output = Vec::new();
        loop {
            match next_event(&mut events).await {
                SessionEvent::Output(bytes) => output.extend(bytes),
                SessionEvent::Closed => break,
                _ => {}
            }
        }
        assert!(String::from_utf8_lossy(&output).contains("tabterm-42"));

        let result = tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn answers_cwd_request() {
        let dir = std::env::temp_dir();
        let options = SessionOptions {
            shell: Some("/bin/sh".into()),
            cwd: Some(dir.clone()),
            size: TermSize::default(),
            detached_grace: None,
        };
        let server = SessionServer::bind(0, options).await.unwrap();
        let port = server.local_port().unwrap();
        let server = tokio::spawn(server.run());

        let (handle, mut events) = open(1, port);
        handle.resend_working_directory();

        let cwd = loop {
            if let SessionEvent::Cwd(cwd) = next_event(&mut events).await {
                break cwd;
            }
        };
        let expected = dir.canonicalize().unwrap();
        assert_eq!(std::path::Path::new(&cwd).canonicalize().unwrap(), expected);

        handle.write_line("exit");
        tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap().unwrap();
    }

    fn short_grace() -> SessionOptions {
        SessionOptions {
            shell: Some("/bin/sh".into()),
            cwd: None,
            size: TermSize::default(),
            detached_grace: Some(Duration::from_millis(300)),
        }
    }

    #[tokio::test]
    async fn exits_when_no_client_ever_attaches() {
        let server = SessionServer::bind(0, short_grace()).await.unwrap();
        let result = tokio::time::timeout(TIMEOUT, server.run()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn exits_after_last_client_detaches() {
        let server = SessionServer::bind(0, short_grace()).await.unwrap();
        let port = server.local_port().unwrap();
        let server = tokio::spawn(server.run());

        let (mut handle, mut events) = open(1, port);
        handle.write_line("echo attached");
        loop {
            if let SessionEvent::Output(_) = next_event(&mut events).await {
                break;
            }
        }
        handle.dispose();

        let result = tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn attached_client_keeps_backend_alive_past_grace() {
        let server = SessionServer::bind(0, short_grace()).await.unwrap();
        let port = server.local_port().unwrap();
        let server = tokio::spawn(server.run());

        let (handle, mut events) = open(1, port);
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(!server.is_finished());

        handle.write_line("exit");
        while !matches!(next_event(&mut events).await, SessionEvent::Closed) {}
        tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap().unwrap();
    }
}
