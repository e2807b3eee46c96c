// * only the creator can see a job; strangers get NotFound
// * completion applied once, redelivery is a no-op, conflicts are refused
// * completion for a job that never started processing is illegal
// * output handle is only handed out for COMPLETED jobs
// * requests are published on the topic matching their type

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stego_core::contract::{
        decode_request, encode_message, InMemoryTransport, JobCompletion, JobRequest, Topic, TransportRecord,
    };
    use stego_core::jobs::{
        CompletionOutcome, InMemoryJobStore, JobError, JobService, JobStateMachine, JobStatus, JobType,
    };
    use stego_core::ports::KeyMaterial;
    use stego_core::types::{BlobHandle, ParticipantRef};

    // ------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------
    struct Fixture {
        service: JobService,
        transport: Arc<InMemoryTransport>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(InMemoryTransport::new());
        let machine = JobStateMachine::new(Arc::new(InMemoryJobStore::new()));
        Fixture { service: JobService::new(machine, transport.clone()), transport }
    }

    fn alice() -> ParticipantRef {
        ParticipantRef::from("alice")
    }

    fn bob() -> ParticipantRef {
        ParticipantRef::from("bob")
    }

    fn key() -> KeyMaterial {
        KeyMaterial::from_bytes(&[7u8; 32])
    }

    fn submit_encode(f: &Fixture) -> stego_core::jobs::Job {
        f.service
            .submit_encode(alice(), bob(), BlobHandle::from("carrier"), BlobHandle::from("secret"), key())
            .unwrap()
    }

    // ------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------
    #[test]
    fn submit_encode_creates_pending_job_and_publishes() {
        let f = fixture();
        let requests = f.transport.subscribe(Topic::EncodeRequest).unwrap();
        let job = submit_encode(&f);

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, JobType::Encode);
        assert_eq!(job.recipient_ref, Some(bob()));
        assert_eq!(job.storage.secret, Some(BlobHandle::from("secret")));
        assert!(job.is_consistent());

        let record = requests.try_recv().unwrap();
        assert_eq!(record.key, job.job_id.to_string());
        match decode_request(&record.payload).unwrap() {
            JobRequest::Encode(r) => {
                assert_eq!(r.job_id, job.job_id);
                assert_eq!(r.recipient_user_id, bob());
                assert_eq!(r.secret_file_id, BlobHandle::from("secret"));
            }
            other => panic!("expected an encode request, got {other:?}"),
        }
    }

    #[test]
    fn submit_decode_goes_to_decode_topic() {
        let f = fixture();
        let decode = f.transport.subscribe(Topic::DecodeRequest).unwrap();
        let encode = f.transport.subscribe(Topic::EncodeRequest).unwrap();
        let job = f.service.submit_decode(bob(), BlobHandle::from("stego"), key()).unwrap();

        assert_eq!(job.job_type, JobType::Decode);
        assert!(job.recipient_ref.is_none());
        assert!(decode.try_recv().is_ok());
        assert!(encode.try_recv().is_err());
    }

    // ------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------
    #[test]
    fn only_creator_sees_job() {
        let f = fixture();
        let job = submit_encode(&f);

        assert_eq!(f.service.job_status(&job.job_id, &alice()).unwrap().job_id, job.job_id);
        // The recipient is not the creator.
        assert!(matches!(f.service.job_status(&job.job_id, &bob()), Err(JobError::NotFound(_))));
        assert!(matches!(
            f.service.job_status(&stego_core::types::JobId::from("nope"), &alice()),
            Err(JobError::NotFound(_))
        ));
    }

    // ------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------
    #[test]
    fn completion_is_idempotent() {
        let f = fixture();
        let job = submit_encode(&f);
        f.service.machine().begin_processing(&job.job_id).unwrap().unwrap();

        let done = JobCompletion::completed(job.job_id.clone(), BlobHandle::from("out-1"));
        let first = f.service.handle_completion(&done).unwrap();
        assert!(matches!(first, CompletionOutcome::Applied(_)));
        let completed_at = first.job().completed_at;
        assert!(completed_at.is_some());

        let again = f.service.handle_completion(&done).unwrap();
        assert!(matches!(again, CompletionOutcome::Duplicate(_)));
        assert_eq!(again.job().completed_at, completed_at);

        let stored = f.service.job_status(&job.job_id, &alice()).unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.storage.output, Some(BlobHandle::from("out-1")));
        assert!(stored.is_consistent());
    }

    #[test]
    fn conflicting_completion_is_refused() {
        let f = fixture();
        let job = submit_encode(&f);
        f.service.machine().begin_processing(&job.job_id).unwrap();
        f.service
            .handle_completion(&JobCompletion::completed(job.job_id.clone(), BlobHandle::from("out-1")))
            .unwrap();

        let failed = JobCompletion::failed(job.job_id.clone(), "late failure");
        assert!(matches!(
            f.service.handle_completion(&failed),
            Err(JobError::CompletionConflict { current: JobStatus::Completed, incoming: JobStatus::Failed, .. })
        ));

        let other_output = JobCompletion::completed(job.job_id.clone(), BlobHandle::from("out-2"));
        assert!(matches!(f.service.handle_completion(&other_output), Err(JobError::CompletionConflict { .. })));

        let stored = f.service.job_status(&job.job_id, &alice()).unwrap();
        assert_eq!(stored.storage.output, Some(BlobHandle::from("out-1")));
        assert!(stored.error_message.is_none());
    }

    #[test]
    fn completion_while_pending_is_illegal() {
        let f = fixture();
        let job = submit_encode(&f);
        let done = JobCompletion::completed(job.job_id.clone(), BlobHandle::from("out"));

        assert!(matches!(
            f.service.handle_completion(&done),
            Err(JobError::IllegalTransition { from: JobStatus::Pending, to: JobStatus::Completed, .. })
        ));
        assert_eq!(f.service.job_status(&job.job_id, &alice()).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn failed_completion_records_error() {
        let f = fixture();
        let job = submit_encode(&f);
        f.service.machine().begin_processing(&job.job_id).unwrap();
        f.service.handle_completion(&JobCompletion::failed(job.job_id.clone(), "decoder exited with code 1")).unwrap();

        let stored = f.service.job_status(&job.job_id, &alice()).unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("decoder exited with code 1"));
        assert!(stored.storage.output.is_none());
        assert!(stored.is_consistent());
    }

    #[test]
    fn completion_for_unknown_job_is_not_found() {
        let f = fixture();
        let done = JobCompletion::completed("ghost".into(), BlobHandle::from("out"));
        assert!(matches!(f.service.handle_completion(&done), Err(JobError::NotFound(_))));
    }

    #[test]
    fn begin_processing_runs_once() {
        let f = fixture();
        let job = submit_encode(&f);
        let started = f.service.machine().begin_processing(&job.job_id).unwrap().unwrap();
        assert_eq!(started.status, JobStatus::Processing);
        assert!(started.status_message.is_some());
        assert!(f.service.machine().begin_processing(&job.job_id).unwrap().is_none());
    }

    #[test]
    fn completion_loop_applies_until_topic_closes() {
        let f = fixture();
        let job = submit_encode(&f);
        f.service.machine().begin_processing(&job.job_id).unwrap();

        let (tx, rx) = crossbeam::channel::unbounded();
        let done = JobCompletion::completed(job.job_id.clone(), BlobHandle::from("out"));
        let record = TransportRecord {
            topic: Topic::JobCompletion,
            key: job.job_id.to_string(),
            payload: encode_message(&done).unwrap().into(),
        };
        tx.send(record.clone()).unwrap();
        tx.send(record).unwrap();
        tx.send(TransportRecord { topic: Topic::JobCompletion, key: "junk".into(), payload: "{".into() }).unwrap();
        drop(tx);

        f.service.run_completion_loop(rx);
        assert_eq!(f.service.job_status(&job.job_id, &alice()).unwrap().status, JobStatus::Completed);
    }

    // ------------------------------------------------------------
    // Output
    // ------------------------------------------------------------
    #[test]
    fn output_handle_requires_completed() {
        let f = fixture();
        let job = submit_encode(&f);
        assert!(matches!(
            f.service.output_handle(&job.job_id, &alice()),
            Err(JobError::OutputUnavailable { .. })
        ));

        f.service.machine().begin_processing(&job.job_id).unwrap();
        f.service
            .handle_completion(&JobCompletion::completed(job.job_id.clone(), BlobHandle::from("stego-out")))
            .unwrap();
        assert_eq!(f.service.output_handle(&job.job_id, &alice()).unwrap(), BlobHandle::from("stego-out"));
        assert!(matches!(f.service.output_handle(&job.job_id, &bob()), Err(JobError::NotFound(_))));
    }
}
