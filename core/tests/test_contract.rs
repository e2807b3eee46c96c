// * request/completion JSON shapes (camelCase, jobType tag)
// * completion shape rules: output iff COMPLETED, error iff FAILED
// * in-memory transport: fan-out, backlog, topic names

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use stego_core::contract::{
        decode_completion, decode_request, encode_message, publish_completion, publish_request, ContractError,
        DecodeRequest, EncodeRequest, InMemoryTransport, JobCompletion, JobRequest, MessageTransport, Topic,
        TransportError, TransportRecord,
    };
    use stego_core::jobs::{JobStatus, JobType};
    use stego_core::ports::KeyMaterial;
    use stego_core::types::{BlobHandle, JobId, ParticipantRef};

    // ------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------
    fn encode_request() -> JobRequest {
        EncodeRequest {
            job_id: JobId::from("job-1"),
            input_file_id: BlobHandle::from("in"),
            secret_file_id: BlobHandle::from("secret"),
            recipient_user_id: ParticipantRef::from("bob"),
            sender_private_key: KeyMaterial::from_encoded("c2VjcmV0"),
        }
        .into()
    }

    fn to_value<T: serde::Serialize>(message: &T) -> Value {
        serde_json::from_slice(&encode_message(message).unwrap()).unwrap()
    }

    // ------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------
    #[test]
    fn encode_request_wire_shape() {
        assert_eq!(
            to_value(&encode_request()),
            json!({
                "jobType": "ENCODE",
                "jobId": "job-1",
                "inputFileId": "in",
                "secretFileId": "secret",
                "recipientUserId": "bob",
                "senderPrivateKey": "c2VjcmV0",
            })
        );
    }

    #[test]
    fn decode_request_parses_from_wire() {
        let raw = br#"{"jobType":"DECODE","jobId":"j2","inputFileId":"stego","recipientPrivateKey":"a2V5"}"#;
        let request = decode_request(raw).unwrap();
        assert_eq!(request.job_type(), JobType::Decode);
        assert_eq!(request.input(), &BlobHandle::from("stego"));
        match request {
            JobRequest::Decode(DecodeRequest { recipient_private_key, .. }) => {
                assert_eq!(recipient_private_key.decode().unwrap(), b"key");
            }
            other => panic!("expected decode request, got {other:?}"),
        }
    }

    #[test]
    fn unknown_job_type_is_rejected() {
        let raw = br#"{"jobType":"TRANSCODE","jobId":"j3","inputFileId":"x"}"#;
        assert!(matches!(decode_request(raw), Err(ContractError::Json(_))));
    }

    #[test]
    fn completion_wire_shapes() {
        let done = JobCompletion::completed("j".into(), "out".into());
        assert_eq!(to_value(&done), json!({"jobId": "j", "status": "COMPLETED", "outputFileId": "out"}));

        let failed = JobCompletion::failed("j".into(), "boom");
        assert_eq!(to_value(&failed), json!({"jobId": "j", "status": "FAILED", "errorMessage": "boom"}));
    }

    #[test]
    fn completion_shape_rules() {
        let bad = [
            br#"{"jobId":"j","status":"COMPLETED"}"#.as_slice(),
            br#"{"jobId":"j","status":"FAILED"}"#,
            br#"{"jobId":"j","status":"FAILED","outputFileId":"o","errorMessage":"e"}"#,
            br#"{"jobId":"j","status":"PROCESSING"}"#,
        ];
        for raw in bad {
            assert!(
                matches!(decode_completion(raw), Err(ContractError::InvalidCompletion { .. })),
                "{}",
                String::from_utf8_lossy(raw)
            );
        }
        let ok = decode_completion(br#"{"jobId":"j","status":"COMPLETED","outputFileId":"o"}"#).unwrap();
        assert_eq!(ok.status, JobStatus::Completed);
    }

    #[test]
    fn key_material_is_redacted_in_debug() {
        let printed = format!("{:?}", encode_request());
        assert!(!printed.contains("c2VjcmV0"));
    }

    // ------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------
    #[test]
    fn topics_round_trip_by_name() {
        for topic in [Topic::EncodeRequest, Topic::DecodeRequest, Topic::JobCompletion] {
            assert_eq!(Topic::from_name(topic.name()), Some(topic));
        }
        assert_eq!(Topic::for_request(JobType::Encode), Topic::EncodeRequest);
        assert_eq!(Topic::for_request(JobType::Decode), Topic::DecodeRequest);
    }

    #[test]
    fn every_subscriber_sees_every_record() {
        let transport = InMemoryTransport::new();
        let a = transport.subscribe(Topic::JobCompletion).unwrap();
        let b = transport.subscribe(Topic::JobCompletion).unwrap();

        publish_completion(&transport, &JobCompletion::completed("j".into(), "o".into())).unwrap();

        for rx in [a, b] {
            let record = rx.try_recv().unwrap();
            assert_eq!(record.key, "j");
            assert_eq!(decode_completion(&record.payload).unwrap().output_file_id, Some("o".into()));
        }
    }

    #[test]
    fn records_wait_for_first_subscriber() {
        let transport = InMemoryTransport::new();
        publish_request(&transport, &encode_request()).unwrap();

        let rx = transport.subscribe(Topic::EncodeRequest).unwrap();
        let record = rx.try_recv().unwrap();
        assert_eq!(record.topic, Topic::EncodeRequest);
        assert_eq!(decode_request(&record.payload).unwrap(), encode_request());
    }

    #[test]
    fn invalid_completion_is_never_published() {
        let transport = InMemoryTransport::new();
        let rx = transport.subscribe(Topic::JobCompletion).unwrap();
        let bad = JobCompletion {
            job_id: "j".into(),
            status: JobStatus::Completed,
            output_file_id: None,
            error_message: None,
        };
        assert!(matches!(publish_completion(&transport, &bad), Err(TransportError::Contract(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let transport = InMemoryTransport::new();
        drop(transport.subscribe(Topic::DecodeRequest).unwrap());
        let record = TransportRecord { topic: Topic::DecodeRequest, key: "k".into(), payload: "{}".into() };
        transport.publish(record).unwrap();

        // Nobody was listening any more, so the next subscriber gets it.
        let rx = transport.subscribe(Topic::DecodeRequest).unwrap();
        assert_eq!(rx.try_recv().unwrap().key, "k");
    }
}
