//! End-to-end transfer scenarios over real loopback sockets.

use skiff_integration_tests::{file_hash, relative_files, spawn_pair};
use skiff_core::Manager;
use skiff_crypto::{KeyStore, Keypair};
use skiff_transport::{ServerConfig, ServerSocket};
use skiff_wire::{PacketTag, CHUNK_SIZE, PIPELINE};
use std::net::TcpListener;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_single_small_file() {
    let tree = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    std::fs::write(tree.path().join("a.txt"), b"hello").unwrap();

    let pair = spawn_pair(tree.path(), dest.path()).await;
    let (tx_registry, rx_registry) = (pair.tx_registry.clone(), pair.rx_registry.clone());
    let (tx, rx) = pair.join().await;
    tx.unwrap();
    rx.unwrap();

    let received = dest.path().join("a.txt");
    assert_eq!(std::fs::read(&received).unwrap(), b"hello");
    assert_eq!(
        file_hash(&received),
        file_hash(&tree.path().join("a.txt"))
    );

    // Exactly one record per side for this session
    assert_eq!(tx_registry.peers_for(tree.path()).len(), 1);
    assert_eq!(rx_registry.peers_for(dest.path()).len(), 1);
    let peer = tx_registry.peers_for(tree.path())[0];
    assert_eq!(
        tx_registry.get(tree.path(), peer).unwrap().status,
        PacketTag::Done
    );
}

#[tokio::test]
async fn test_file_of_exactly_one_chunk() {
    let tree = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    std::fs::write(tree.path().join("chunk.bin"), vec![0x41u8; CHUNK_SIZE]).unwrap();

    let (tx, rx) = spawn_pair(tree.path(), dest.path()).await.join().await;
    tx.unwrap();
    rx.unwrap();

    // The receiver pipelines PIPELINE requests, gets one full chunk and
    // nine empty replies, and still lands exactly CHUNK_SIZE bytes.
    let received = std::fs::read(dest.path().join("chunk.bin")).unwrap();
    assert_eq!(received.len(), CHUNK_SIZE);
    assert!(received.iter().all(|&b| b == 0x41));
}

#[tokio::test]
async fn test_empty_file() {
    let tree = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    std::fs::write(tree.path().join("empty"), b"").unwrap();

    let (tx, rx) = spawn_pair(tree.path(), dest.path()).await.join().await;
    tx.unwrap();
    rx.unwrap();

    assert_eq!(
        std::fs::metadata(dest.path().join("empty")).unwrap().len(),
        0
    );
}

#[tokio::test]
async fn test_nested_tree_reproduced() {
    let tree = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();

    std::fs::create_dir_all(tree.path().join("d/sub/deeper")).unwrap();
    let big: Vec<u8> = (0..600_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(tree.path().join("d/sub/x.bin"), &big).unwrap();
    std::fs::write(tree.path().join("d/sub/deeper/y.txt"), b"nested").unwrap();
    std::fs::write(tree.path().join("top.txt"), b"top level").unwrap();

    let (tx, rx) = spawn_pair(tree.path(), dest.path()).await.join().await;
    tx.unwrap();
    rx.unwrap();

    assert_eq!(relative_files(dest.path()), relative_files(tree.path()));
    for rel in relative_files(tree.path()) {
        assert_eq!(
            file_hash(&dest.path().join(&rel)),
            file_hash(&tree.path().join(&rel)),
            "content mismatch for {rel:?}"
        );
    }
}

#[tokio::test]
async fn test_empty_directory_transfers_nothing() {
    let tree = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();

    let (tx, rx) = spawn_pair(tree.path(), dest.path()).await.join().await;
    tx.unwrap();
    rx.unwrap();

    assert!(relative_files(dest.path()).is_empty());
}

#[tokio::test]
async fn test_single_file_publish_sends_bare_name() {
    let tree = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let file = tree.path().join("solo.dat");
    std::fs::write(&file, vec![7u8; 1234]).unwrap();

    let (tx, rx) = spawn_pair(&file, dest.path()).await.join().await;
    tx.unwrap();
    rx.unwrap();

    assert_eq!(relative_files(dest.path()), vec![PathBuf::from("solo.dat")]);
    assert_eq!(file_hash(&dest.path().join("solo.dat")), file_hash(&file));
}

#[tokio::test]
async fn test_receiver_retries_until_transmitter_binds() {
    let tree = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    std::fs::write(tree.path().join("late.txt"), b"worth the wait").unwrap();

    // Reserve a port, then leave it unbound while the receiver retries.
    let port = {
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };

    let ctx = skiff_transport::Context::new();
    let tx_keys = Keypair::generate().unwrap();
    let rx_task = tokio::spawn(skiff_core::run_receiver(
        skiff_transport::ClientConfig {
            addr: format!("127.0.0.1:{port}").parse().unwrap(),
            keypair: Keypair::generate().unwrap(),
            server_key: *tx_keys.public_key(),
            hwm: PIPELINE,
        },
        ctx.clone(),
        skiff_core::ReceiverConfig {
            local_id: uuid::Uuid::new_v4(),
            destination: dest.path().to_path_buf(),
            registry: skiff_core::Registry::new(),
        },
    ));

    tokio::time::sleep(Duration::from_secs(3)).await;

    let server = ServerSocket::bind(
        ServerConfig {
            port,
            keypair: tx_keys,
            whitelist: Vec::new(),
            hwm: PIPELINE,
        },
        &ctx,
    )
    .await
    .unwrap();
    let tx_task = tokio::spawn(skiff_core::run_transmitter(
        server,
        skiff_core::TransmitterConfig {
            local_id: uuid::Uuid::new_v4(),
            published: tree.path().to_path_buf(),
            registry: skiff_core::Registry::new(),
            updates: Box::new(|| true),
        },
    ));

    tx_task.await.unwrap().unwrap();
    rx_task.await.unwrap().unwrap();
    assert_eq!(
        std::fs::read(dest.path().join("late.txt")).unwrap(),
        b"worth the wait"
    );
}

#[tokio::test]
async fn test_shutdown_mid_transfer_exits_cleanly() {
    let tree = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    // Enough data that shutdown lands mid-stream.
    for i in 0..8 {
        std::fs::write(
            tree.path().join(format!("f{i}.bin")),
            vec![i as u8; 4 * CHUNK_SIZE],
        )
        .unwrap();
    }

    let pair = spawn_pair(tree.path(), dest.path()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    pair.ctx.shutdown();

    let joined = tokio::time::timeout(Duration::from_secs(10), pair.join())
        .await
        .expect("sessions wind down within a receive-timeout cycle");
    let (tx, rx) = joined;
    tx.unwrap();
    rx.unwrap();
}

#[tokio::test]
async fn test_manager_pair_end_to_end() {
    let tree = TempDir::new().unwrap();
    let dest_root = TempDir::new().unwrap();
    let dest = dest_root.path().join("incoming");
    std::fs::create_dir_all(tree.path().join("docs")).unwrap();
    std::fs::write(tree.path().join("docs/readme.md"), b"# skiff").unwrap();
    std::fs::write(tree.path().join("data.bin"), vec![3u8; 300_000]).unwrap();

    let tx_home = TempDir::new().unwrap();
    let rx_home = TempDir::new().unwrap();
    KeyStore::new(tx_home.path()).generate().unwrap();
    KeyStore::new(rx_home.path()).generate().unwrap();

    let transmitter = Manager::new(tx_home.path());
    let receiver = Manager::new(rx_home.path());
    let server_key = hex::encode(transmitter.local_public_key().unwrap());

    let port = {
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };

    let tx_handle = transmitter.publish(port, tree.path(), None).await.unwrap();
    let rx_handle = receiver
        .subscribe("127.0.0.1".parse().unwrap(), port, &dest, &server_key)
        .await
        .unwrap();

    tx_handle.await.unwrap().unwrap();
    rx_handle.await.unwrap().unwrap();

    assert_eq!(relative_files(&dest), relative_files(tree.path()));
    for rel in relative_files(tree.path()) {
        assert_eq!(file_hash(&dest.join(&rel)), file_hash(&tree.path().join(&rel)));
    }

    // One record per side, terminal status recorded.
    let tx_peers = transmitter.registry().peers_for(tree.path());
    assert_eq!(tx_peers.len(), 1);
    assert_eq!(
        transmitter
            .registry()
            .get(tree.path(), tx_peers[0])
            .unwrap()
            .status,
        PacketTag::Done
    );
    let rx_peers = receiver.registry().peers_for(&dest);
    assert_eq!(rx_peers.len(), 1);
    assert_eq!(rx_peers[0], transmitter.peer_id());
}
