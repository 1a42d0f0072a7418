//! 集成测试 - 回环地址上的端到端传输
//!
//! 每个测试都在临时目录和系统分配的端口上运行一对发送端/接收端。

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use wifisender_core::{
    CancellationToken, FileReceiver, FileSender, ReceiveOptions, SendOptions, SessionEvent,
    SessionHandle, SessionOutcome, SessionState, TransferCallback, TransferError,
    TransferProgress, TransferSession, TransferredFile,
};

fn receive_options(dir: &Path) -> ReceiveOptions {
    ReceiveOptions {
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        output_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

/// 取完会话的所有事件，再等待其结果
async fn drain(
    mut handle: SessionHandle,
) -> (Vec<SessionEvent>, Result<SessionOutcome, TransferError>) {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    (events, handle.join().await)
}

/// 在 `dir` 下写入一组文件，返回它们的路径
fn write_files(dir: &Path, files: &[(&str, Vec<u8>)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(name, content)| {
            let path = dir.join(name);
            std::fs::write(&path, content).unwrap();
            path
        })
        .collect()
}

fn progress_events(events: &[SessionEvent]) -> Vec<(f64, TransferProgress)> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Progress { percent, progress } => Some((*percent, *progress)),
            _ => None,
        })
        .collect()
}

fn unused_port() -> u16 {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

/// 测试 a.txt + 空文件 b.bin 的完整往返
#[tokio::test]
async fn test_round_trip_text_and_empty_file() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let files = write_files(
        src.path(),
        &[("a.txt", b"hello world".to_vec()), ("b.bin", Vec::new())],
    );

    let receiver = FileReceiver::bind(receive_options(dst.path())).await.unwrap();
    let port = receiver.local_addr().port();
    let receiving = tokio::spawn(drain(TransferSession::serve(receiver)));

    let (send_events, sent) =
        drain(TransferSession::send(SendOptions::default(), "127.0.0.1", port, files)).await;
    let (recv_events, received) = receiving.await.unwrap();

    let sent = sent.unwrap();
    let received = received.unwrap();
    assert_eq!(sent.state, SessionState::Complete);
    assert_eq!(received.state, SessionState::Complete);

    // 目录中恰好是这两个文件
    let mut names: Vec<String> = std::fs::read_dir(dst.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.txt", "b.bin"]);
    assert_eq!(
        std::fs::read(dst.path().join("a.txt")).unwrap(),
        b"hello world"
    );
    assert_eq!(
        std::fs::metadata(dst.path().join("b.bin")).unwrap().len(),
        0
    );

    // 接收端对每个文件都报告过 100%
    let progress = progress_events(&recv_events);
    for index in 0..2 {
        assert!(
            progress
                .iter()
                .any(|(p, pr)| pr.file_index == index && (*p - 100.0).abs() < f64::EPSILON),
            "no 100% for file {index}"
        );
    }

    // 发送端状态文本与原程序一致
    let statuses: Vec<&str> = send_events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Status { message } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert!(statuses.contains(&"Sent 1/2: a.txt"));
    assert!(statuses.contains(&"Sent 2/2: b.bin"));
    assert_eq!(statuses.last(), Some(&"All files sent successfully!"));

    let recv_statuses: Vec<&str> = recv_events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Status { message } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert!(recv_statuses.contains(&"Received: a.txt"));
    assert!(recv_statuses.contains(&"Received: b.bin"));
    assert_eq!(recv_statuses.last(), Some(&"Transfer complete!"));
}

/// 多个多分块文件逐字节一致且保持发送顺序
#[tokio::test]
async fn test_many_files_preserve_content_and_order() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    let big: Vec<u8> = (0..200 * 1024 + 1).map(|i| (i % 251) as u8).collect();
    let mid: Vec<u8> = (0..64 * 1024).map(|i| (i % 13) as u8).collect();
    let contents = [
        ("z-first.bin", big),
        ("m-second.dat", mid),
        ("a-third.txt", b"third".to_vec()),
    ];
    let files = write_files(src.path(), &contents);

    let receiver = FileReceiver::bind(receive_options(dst.path())).await.unwrap();
    let port = receiver.local_addr().port();
    let receiving = tokio::spawn(drain(TransferSession::serve(receiver)));

    let (_, sent) =
        drain(TransferSession::send(SendOptions::default(), "127.0.0.1", port, files)).await;
    let (recv_events, received) = receiving.await.unwrap();
    sent.unwrap();
    let received = received.unwrap();

    let order: Vec<String> = recv_events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::FileComplete { file } => Some(file.name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec!["z-first.bin", "m-second.dat", "a-third.txt"]);
    assert_eq!(received.completed_files(), 3);

    for (name, content) in &contents {
        assert_eq!(&std::fs::read(dst.path().join(name)).unwrap(), content);
    }
}

/// 发送零个文件时只发送哨兵
#[tokio::test]
async fn test_zero_files_sends_only_end_marker() {
    let dst = tempfile::tempdir().unwrap();

    let receiver = FileReceiver::bind(receive_options(dst.path())).await.unwrap();
    let port = receiver.local_addr().port();
    let receiving = tokio::spawn(drain(TransferSession::serve(receiver)));

    let (send_events, sent) = drain(TransferSession::send(
        SendOptions::default(),
        "127.0.0.1",
        port,
        Vec::new(),
    ))
    .await;
    let (_, received) = receiving.await.unwrap();

    assert!(sent.unwrap().is_complete());
    let received = received.unwrap();
    assert_eq!(received.state, SessionState::Complete);
    assert!(received.files.is_empty());
    assert_eq!(std::fs::read_dir(dst.path()).unwrap().count(), 0);

    let last = progress_events(&send_events).last().copied().unwrap();
    assert!((last.0 - 100.0).abs() < f64::EPSILON);
}

/// 字节计数严格递增，只有完成时才到 100%
#[tokio::test]
async fn test_progress_reaches_hundred_only_at_completion() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let size = 5 * 64 * 1024 + 123;
    let files = write_files(src.path(), &[("blob.bin", vec![0xAB; size])]);

    let receiver = FileReceiver::bind(receive_options(dst.path())).await.unwrap();
    let port = receiver.local_addr().port();
    let receiving = tokio::spawn(drain(TransferSession::serve(receiver)));

    let (send_events, sent) =
        drain(TransferSession::send(SendOptions::default(), "127.0.0.1", port, files)).await;
    let (recv_events, received) = receiving.await.unwrap();
    sent.unwrap();
    received.unwrap();

    for events in [&send_events, &recv_events] {
        let chunks: Vec<(f64, TransferProgress)> = progress_events(events)
            .into_iter()
            .filter(|(_, p)| p.file_size == size as u64)
            .collect();
        assert!(!chunks.is_empty());

        for pair in chunks.windows(2) {
            assert!(pair[1].1.bytes_transferred > pair[0].1.bytes_transferred);
            assert!(pair[1].0 >= pair[0].0);
        }

        let (last_percent, last) = *chunks.last().unwrap();
        assert_eq!(last.bytes_transferred, size as u64);
        assert!((last_percent - 100.0).abs() < f64::EPSILON);
        assert!(
            chunks[..chunks.len() - 1]
                .iter()
                .all(|(p, _)| *p < 100.0)
        );
    }
}

/// 第二个接收端绑定同一端口时立即失败
#[tokio::test]
async fn test_second_receiver_port_in_use() {
    let dst = tempfile::tempdir().unwrap();
    let first = FileReceiver::bind(receive_options(dst.path())).await.unwrap();
    let port = first.local_addr().port();

    let options = ReceiveOptions {
        port,
        ..receive_options(dst.path())
    };
    let (events, result) = tokio::time::timeout(
        Duration::from_secs(5),
        drain(TransferSession::receive(options)),
    )
    .await
    .expect("second receiver blocked");

    assert!(matches!(result, Err(TransferError::PortInUse { port: p }) if p == port));
    assert!(events.contains(&SessionEvent::Status {
        message: "Port already in use".to_string()
    }));
    drop(first);
}

/// 没有监听者时在连接超时内返回 ConnectionRefused
#[tokio::test]
async fn test_refused_within_connect_timeout() {
    let port = unused_port();
    let options = SendOptions {
        connect_timeout: Duration::from_secs(10),
        ..Default::default()
    };

    let started = Instant::now();
    let result = FileSender::new(options)
        .send(
            "127.0.0.1",
            port,
            &[],
            &wifisender_core::NoopCallback,
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(TransferError::ConnectionRefused { .. })));
    assert!(started.elapsed() < Duration::from_secs(10));
}

/// 第一个文件完成后取消
struct CancelAfterFirstFile {
    cancel: CancellationToken,
}

impl TransferCallback for CancelAfterFirstFile {
    fn on_state(&self, _state: SessionState) {}
    fn on_status(&self, _status: &str) {}
    fn on_progress(&self, _percent: f64, _progress: &TransferProgress) {}

    fn on_file_complete(&self, file: &TransferredFile) {
        if file.name == "one.txt" {
            self.cancel.cancel();
        }
    }

    fn on_error(&self, error: &TransferError) {
        panic!("unexpected error: {error}");
    }
}

/// 在第 1 个和第 2 个文件之间取消：接收端只有一个完整文件，状态为 Cancelled
#[tokio::test]
async fn test_cancel_between_files() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let files = write_files(
        src.path(),
        &[
            ("one.txt", b"first file".to_vec()),
            ("two.txt", vec![2u8; 100 * 1024]),
            ("three.txt", b"third".to_vec()),
        ],
    );

    let receiver = FileReceiver::bind(receive_options(dst.path())).await.unwrap();
    let port = receiver.local_addr().port();
    let receiving = tokio::spawn(drain(TransferSession::serve(receiver)));

    let cancel = CancellationToken::new();
    let callback = CancelAfterFirstFile {
        cancel: cancel.clone(),
    };
    let sent = FileSender::new(SendOptions::default())
        .send("127.0.0.1", port, &files, &callback, &cancel)
        .await
        .unwrap();
    let (recv_events, received) = receiving.await.unwrap();
    let received = received.unwrap();

    assert_eq!(sent.state, SessionState::Cancelled);
    assert_eq!(sent.files.len(), 1);

    assert_eq!(received.state, SessionState::Cancelled);
    assert_eq!(received.files.len(), 1);
    assert!(received.files[0].is_complete());
    assert!(!recv_events.iter().any(|e| matches!(e, SessionEvent::Error { .. })));

    let entries: Vec<String> = std::fs::read_dir(dst.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec!["one.txt"]);
    assert_eq!(
        std::fs::read(dst.path().join("one.txt")).unwrap(),
        b"first file"
    );
}

/// 接收端在等待连接时取消，端口被释放
#[tokio::test]
async fn test_cancel_listening_receiver() {
    let dst = tempfile::tempdir().unwrap();
    let receiver = FileReceiver::bind(receive_options(dst.path())).await.unwrap();
    let port = receiver.local_addr().port();

    let handle = TransferSession::serve(receiver);
    handle.cancel();
    let (events, result) = drain(handle).await;

    let outcome = result.unwrap();
    assert_eq!(outcome.state, SessionState::Cancelled);
    assert!(events.contains(&SessionEvent::State {
        state: SessionState::Cancelled
    }));

    let options = ReceiveOptions {
        port,
        ..receive_options(dst.path())
    };
    assert!(FileReceiver::bind(options).await.is_ok());
}
