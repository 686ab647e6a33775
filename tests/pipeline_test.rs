use std::path::PathBuf;
use std::sync::Arc;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use cbc::Encryptor;
use reqwest::Client;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use m3u8_archiver_rs::config::Conventions;
use m3u8_archiver_rs::decryptor::SegmentDecryptor;

const KEY_BYTES: [u8; 16] = *b"0123456789abcdef";
const ZERO_IV: [u8; 16] = [0u8; 16];
const KEY_PATH: &str = "/v2/keys/media/drama/epochs/cc-20260101/aes.key";

fn encrypt_with(key: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    let plain_len = buf.len();
    buf.resize(plain_len + 16, 0);
    Encryptor::<aes::Aes128>::new(key.into(), &ZERO_IV.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plain_len)
        .expect("encrypt fixture")
        .to_vec()
}

fn encrypt(plaintext: &[u8]) -> Vec<u8> {
    encrypt_with(&KEY_BYTES, plaintext)
}

fn encrypted_manifest(origin: &str) -> String {
    format!(
        "#EXTM3U\n\
         #EXT-X-TARGETDURATION:6\n\
         #EXT-X-KEY:METHOD=AES-128,URI=\"{origin}{KEY_PATH}\",IV=0x00000000000000000000000000000000\n\
         #EXTINF:6.0,\n\
         {origin}/drama/ep1/seg-0.ts\n\
         #EXTINF:6.0,\n\
         {origin}/drama/ep1/seg-1.ts\n"
    )
}

fn decryptor(output_root: PathBuf) -> SegmentDecryptor {
    SegmentDecryptor::new(
        Arc::new(Client::new()),
        output_root,
        None,
        Conventions::default(),
    )
}

#[tokio::test]
async fn test_process_decrypts_and_skips_on_rerun() {
    let server = MockServer::start().await;
    let plain_0 = b"first segment plaintext".to_vec();
    let plain_1 = b"second segment plaintext, long enough for two blocks".to_vec();

    // One key fetch total: deduplicated on the first run, skipped on the second.
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(KEY_BYTES.to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drama/ep1/seg-0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(encrypt(&plain_0)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drama/ep1/seg-1.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(encrypt(&plain_1)))
        .expect(1)
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let manifest = encrypted_manifest(&server.uri());
    let decryptor = decryptor(out.path().to_path_buf());

    let summary = decryptor.process(&manifest, "myshow").await.unwrap();
    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed(), 0);

    let seg_0 = out.path().join("myshow/20260101/ep1/seg-0.ts");
    let seg_1 = out.path().join("myshow/20260101/ep1/seg-1.ts");
    assert_eq!(std::fs::read(&seg_0).unwrap(), plain_0);
    assert_eq!(std::fs::read(&seg_1).unwrap(), plain_1);

    // Second run against the unchanged manifest: everything already on disk.
    let summary = decryptor.process(&manifest, "myshow").await.unwrap();
    assert_eq!(summary.written, 0);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.failed(), 0);
    assert_eq!(std::fs::read(&seg_0).unwrap(), plain_0);
}

#[tokio::test]
async fn test_unencrypted_segment_written_as_fetched() {
    let server = MockServer::start().await;
    let body = b"clear segment bytes".to_vec();

    Mock::given(method("GET"))
        .and(path("/drama/ep1/seg-9.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let manifest = format!(
        "#EXTM3U\n#EXTINF:6.0,\n{}/drama/ep1/seg-9.ts\n",
        server.uri()
    );
    let summary = decryptor(out.path().to_path_buf())
        .process(&manifest, "myshow")
        .await
        .unwrap();

    assert_eq!(summary.written, 1);
    let written = out.path().join("myshow/clear/ep1/seg-9.ts");
    assert_eq!(std::fs::read(&written).unwrap(), body);
}

#[tokio::test]
async fn test_failed_segment_does_not_abort_remaining() {
    let server = MockServer::start().await;
    let plain_1 = b"surviving segment".to_vec();

    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(KEY_BYTES.to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drama/ep1/seg-0.ts"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drama/ep1/seg-1.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(encrypt(&plain_1)))
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let manifest = encrypted_manifest(&server.uri());
    let summary = decryptor(out.path().to_path_buf())
        .process(&manifest, "myshow")
        .await
        .unwrap();

    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.written, 1);
    assert!(!out.path().join("myshow/20260101/ep1/seg-0.ts").exists());
    assert_eq!(
        std::fs::read(out.path().join("myshow/20260101/ep1/seg-1.ts")).unwrap(),
        plain_1
    );
}

#[tokio::test]
async fn test_empty_manifest_is_nothing_to_do() {
    let out = tempfile::tempdir().unwrap();
    let summary = decryptor(out.path().to_path_buf())
        .process("#EXTM3U\n#EXT-X-VERSION:3\n", "myshow")
        .await
        .unwrap();
    assert_eq!(summary.total(), 0);
}

#[tokio::test]
async fn test_undecryptable_segment_fails_without_writing() {
    let server = MockServer::start().await;
    let plain_1 = b"second segment survives".to_vec();

    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(KEY_BYTES.to_vec()))
        .mount(&server)
        .await;
    // Truncated ciphertext: not a whole number of AES blocks.
    Mock::given(method("GET"))
        .and(path("/drama/ep1/seg-0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 17]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drama/ep1/seg-1.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(encrypt(&plain_1)))
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let manifest = encrypted_manifest(&server.uri());
    let summary = decryptor(out.path().to_path_buf())
        .process(&manifest, "myshow")
        .await
        .unwrap();

    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.written, 1);
    assert!(!out.path().join("myshow/20260101/ep1/seg-0.ts").exists());
    assert_eq!(
        std::fs::read(out.path().join("myshow/20260101/ep1/seg-1.ts")).unwrap(),
        plain_1
    );
}
