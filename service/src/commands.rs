//! Line protocol: one JSON object per line in each direction.
//!
//! `{"id": "7", "cmd": "status", "jobId": "...", "requester": "alice"}`
//! is answered by `{"id": "7", "event": "status", "job": {...}}`. Job
//! completions arrive unprompted as `{"event": "jobCompleted", ...}`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use stego_core::jobs::Job;
use stego_core::ports::KeyMaterial;
use stego_core::stego::CapacityEstimate;
use stego_core::types::{BlobHandle, JobId, ParticipantRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// Hide the contents of `secret_path` in the carrier at `carrier_path`.
    SubmitEncode {
        sender: ParticipantRef,
        recipient: ParticipantRef,
        carrier_path: PathBuf,
        secret_path: PathBuf,
        sender_private_key: KeyMaterial,
    },
    SubmitDecode {
        requester: ParticipantRef,
        carrier_path: PathBuf,
        recipient_private_key: KeyMaterial,
    },
    Status {
        job_id: JobId,
        requester: ParticipantRef,
    },
    Output {
        job_id: JobId,
        requester: ParticipantRef,
    },
    Estimate {
        carrier_path: PathBuf,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Echoed back on the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Reply {
    Submitted { job: Job },
    Status { job: Job },
    Output { job_id: JobId, output_file_id: BlobHandle, path: PathBuf },
    Estimate { estimate: CapacityEstimate },
    JobCompleted { job: Job },
    Error { message: String },
    ShuttingDown,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub reply: Reply,
}

impl ReplyEnvelope {
    pub fn to(id: Option<String>, reply: Reply) -> Self {
        Self { id, reply }
    }

    /// Not a reply to any command.
    pub fn event(reply: Reply) -> Self {
        Self { id: None, reply }
    }

    pub fn error(id: Option<String>, message: impl Into<String>) -> Self {
        Self { id, reply: Reply::Error { message: message.into() } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn submit_encode_parses_camel_case() {
        let line = r#"{"id":"1","cmd":"submitEncode","sender":"alice","recipient":"bob",
            "carrierPath":"/tmp/c.mkv","secretPath":"/tmp/s.bin","senderPrivateKey":"a2V5"}"#;
        let envelope: CommandEnvelope = serde_json::from_str(line).unwrap();
        assert_eq!(envelope.id.as_deref(), Some("1"));
        match envelope.command {
            Command::SubmitEncode { sender, carrier_path, sender_private_key, .. } => {
                assert_eq!(sender, ParticipantRef::from("alice"));
                assert_eq!(carrier_path, PathBuf::from("/tmp/c.mkv"));
                assert_eq!(sender_private_key.decode().unwrap(), b"key");
            }
            other => panic!("expected submitEncode, got {other:?}"),
        }
    }

    #[test]
    fn shutdown_needs_no_fields() {
        let envelope: CommandEnvelope = serde_json::from_str(r#"{"cmd":"shutdown"}"#).unwrap();
        assert_eq!(envelope.command, Command::Shutdown);
        assert!(envelope.id.is_none());
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<CommandEnvelope>(r#"{"cmd":"reboot"}"#).is_err());
    }

    #[test]
    fn error_reply_shape() {
        let reply = ReplyEnvelope::error(Some("9".into()), "job x not found");
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"id": "9", "event": "error", "message": "job x not found"})
        );
        let bye = serde_json::to_value(ReplyEnvelope::event(Reply::ShuttingDown)).unwrap();
        assert_eq!(bye, json!({"event": "shuttingDown"}));
    }
}
