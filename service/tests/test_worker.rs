// * full line-protocol session against a raw-frame worker:
//   estimate, submitEncode, jobCompleted, output, submitDecode, shutdown
// * malformed lines, invisible jobs and oversized secrets produce error
//   replies, not exits

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

    use stego_core::codec::{FrameGeometry, FrameRate};
    use stego_core::config::PipelineConfig;
    use stego_core::ports::KeyMaterial;
    use stego_service::{CodecSelection, ServiceConfig, Worker};

    const ALICE_KEY: [u8; 32] = [0x11; 32];
    const BOB_KEY: [u8; 32] = [0x22; 32];

    // ------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------
    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("stego-worker-{}", uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn key(bytes: &[u8]) -> Value {
        serde_json::to_value(KeyMaterial::from_bytes(bytes)).unwrap()
    }

    fn config(dir: &PathBuf, geometry: FrameGeometry) -> ServiceConfig {
        let keys = json!({ "alice": key(&ALICE_KEY), "bob": key(&BOB_KEY) });
        let key_file = dir.join("keys.json");
        fs::write(&key_file, keys.to_string()).unwrap();

        ServiceConfig {
            pipeline: PipelineConfig::default()
                .with_job_timeout(Duration::from_secs(30))
                .with_max_concurrent_pipelines(2),
            blob_root: dir.join("blobs"),
            key_file: Some(key_file),
            codec: CodecSelection::Raw(geometry),
        }
    }

    struct Client {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
        /// Lines read while waiting for something else.
        unclaimed: Vec<Value>,
    }

    impl Client {
        async fn send(&mut self, command: Value) {
            self.send_raw(&command.to_string()).await;
        }

        async fn send_raw(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn wait_for(&mut self, wanted: impl Fn(&Value) -> bool) -> Value {
            if let Some(pos) = self.unclaimed.iter().position(&wanted) {
                return self.unclaimed.remove(pos);
            }
            loop {
                let line = tokio::time::timeout(Duration::from_secs(30), self.lines.next_line())
                    .await
                    .expect("no reply in time")
                    .unwrap()
                    .expect("worker closed its output");
                let value: Value = serde_json::from_str(&line).unwrap();
                if wanted(&value) {
                    return value;
                }
                self.unclaimed.push(value);
            }
        }

        async fn reply(&mut self, id: &str) -> Value {
            self.wait_for(|v| v["id"] == id).await
        }

        async fn completion(&mut self, job_id: &Value) -> Value {
            let job_id = job_id.clone();
            self.wait_for(move |v| v["event"] == "jobCompleted" && v["job"]["jobId"] == job_id).await
        }
    }

    // ------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------
    #[tokio::test]
    async fn line_protocol_session() {
        let dir = scratch_dir();
        let geometry = FrameGeometry::new(16, 16, FrameRate::per_second(1).unwrap()).unwrap();
        let worker = Worker::start(&config(&dir, geometry)).unwrap();

        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (server_rx, server_tx) = tokio::io::split(server_io);
        let server = tokio::spawn(worker.serve(server_rx, server_tx));

        let (client_rx, client_tx) = tokio::io::split(client_io);
        let mut client = Client { lines: BufReader::new(client_rx).lines(), writer: client_tx, unclaimed: Vec::new() };

        let carrier: Vec<u8> = (0..geometry.frame_bytes() * 4).map(|i| (i % 239) as u8).collect();
        let carrier_path = dir.join("carrier.raw");
        fs::write(&carrier_path, &carrier).unwrap();
        let secret = b"the package is under the bridge".to_vec();
        let secret_path = dir.join("secret.txt");
        fs::write(&secret_path, &secret).unwrap();

        // Capacity
        client.send(json!({"id": "e1", "cmd": "estimate", "carrierPath": carrier_path})).await;
        let estimate = client.reply("e1").await;
        assert_eq!(estimate["event"], "estimate");
        assert_eq!(estimate["estimate"]["totalRawBytes"], carrier.len() as u64);
        assert_eq!(estimate["estimate"]["frameCount"], 4);

        // Encode
        client
            .send(json!({
                "id": "s1",
                "cmd": "submitEncode",
                "sender": "alice",
                "recipient": "bob",
                "carrierPath": carrier_path,
                "secretPath": secret_path,
                "senderPrivateKey": key(&ALICE_KEY),
            }))
            .await;
        let submitted = client.reply("s1").await;
        assert_eq!(submitted["event"], "submitted", "{submitted}");
        let enc_id = submitted["job"]["jobId"].clone();

        let done = client.completion(&enc_id).await;
        assert_eq!(done["job"]["status"], "COMPLETED", "{done}");

        client.send(json!({"id": "o1", "cmd": "output", "jobId": enc_id, "requester": "alice"})).await;
        let output = client.reply("o1").await;
        let stego_path = PathBuf::from(output["path"].as_str().unwrap());
        assert_eq!(fs::read(&stego_path).unwrap().len(), carrier.len());

        // Only the creator can see the job.
        client.send(json!({"id": "x1", "cmd": "status", "jobId": enc_id, "requester": "bob"})).await;
        let hidden = client.reply("x1").await;
        assert_eq!(hidden["event"], "error");

        // Decode
        client
            .send(json!({
                "id": "s2",
                "cmd": "submitDecode",
                "requester": "bob",
                "carrierPath": stego_path,
                "recipientPrivateKey": key(&BOB_KEY),
            }))
            .await;
        let dec_id = client.reply("s2").await["job"]["jobId"].clone();
        let done = client.completion(&dec_id).await;
        assert_eq!(done["job"]["status"], "COMPLETED", "{done}");

        client.send(json!({"id": "o2", "cmd": "output", "jobId": dec_id, "requester": "bob"})).await;
        let output = client.reply("o2").await;
        assert_eq!(fs::read(output["path"].as_str().unwrap()).unwrap(), secret);

        client.send(json!({"id": "q", "cmd": "shutdown"})).await;
        assert_eq!(client.reply("q").await["event"], "shuttingDown");
        server.await.unwrap().unwrap();

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn bad_lines_get_error_replies() {
        let dir = scratch_dir();
        let geometry = FrameGeometry::new(4, 4, FrameRate::per_second(1).unwrap()).unwrap();
        let worker = Worker::start(&config(&dir, geometry)).unwrap();

        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        let (server_rx, server_tx) = tokio::io::split(server_io);
        let server = tokio::spawn(worker.serve(server_rx, server_tx));
        let (client_rx, client_tx) = tokio::io::split(client_io);
        let mut client = Client { lines: BufReader::new(client_rx).lines(), writer: client_tx, unclaimed: Vec::new() };

        client.send_raw("this is not json").await;
        let err = client.wait_for(|v| v["event"] == "error").await;
        assert!(err["message"].as_str().unwrap().contains("malformed command"));

        client.send(json!({"id": "m", "cmd": "status", "jobId": "missing", "requester": "alice"})).await;
        let missing = client.reply("m").await;
        assert_eq!(missing["event"], "error");
        assert!(missing["message"].as_str().unwrap().contains("not found"));

        client.send(json!({"id": "n", "cmd": "estimate", "carrierPath": dir.join("absent.raw")})).await;
        assert_eq!(client.reply("n").await["event"], "error");

        // A secret the carrier cannot hold is refused at submission.
        let carrier_path = dir.join("tiny.raw");
        fs::write(&carrier_path, vec![0u8; geometry.frame_bytes() * 2]).unwrap();
        let secret_path = dir.join("big.txt");
        fs::write(&secret_path, vec![b'x'; 64]).unwrap();
        client
            .send(json!({
                "id": "r",
                "cmd": "submitEncode",
                "sender": "alice",
                "recipient": "bob",
                "carrierPath": carrier_path,
                "secretPath": secret_path,
                "senderPrivateKey": key(&ALICE_KEY),
            }))
            .await;
        let rejected = client.reply("r").await;
        assert_eq!(rejected["event"], "error", "{rejected}");
        assert!(rejected["message"].as_str().unwrap().contains("rejected"), "{rejected}");

        // Closing input ends the session cleanly.
        drop(client);
        server.await.unwrap().unwrap();
        let _ = fs::remove_dir_all(&dir);
    }
}
