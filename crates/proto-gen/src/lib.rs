//! Generated Protocol Buffer code for the signal cluster backends.
//!
//! Compiled from `proto/` at build time (client stubs only):
//!
//! - [`relay`] - `signal.relay.RelayService` (publish/unpublish/subscribe/unsubscribe)
//! - [`directory`] - `signal.directory.DirectoryService` (room membership and stream records)

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)] // Generated code has various doc formatting

// Re-export prost traits for convenience
pub use prost::Message;

// Generated protobuf modules
pub mod relay {
    //! Media relay node service
    include!(concat!(env!("OUT_DIR"), "/signal.relay.rs"));

    pub use relay_service_client::RelayServiceClient;
}

pub mod directory {
    //! Cluster directory service
    include!(concat!(env!("OUT_DIR"), "/signal.directory.rs"));

    pub use directory_service_client::DirectoryServiceClient;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reply_decodes_answer_and_mid() {
        let reply = relay::PublishReply {
            mediainfo: Some(relay::MediaInfo {
                mid: "m1".to_string(),
            }),
            description: Some(relay::SessionDescription {
                r#type: "answer".to_string(),
                sdp: "v=0".to_string(),
            }),
            stream_info: r#"{"tracks":2}"#.to_string(),
        };

        let decoded = relay::PublishReply::decode(reply.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.mediainfo.unwrap().mid, "m1");
        assert_eq!(decoded.description.unwrap().r#type, "answer");
    }

    #[test]
    fn test_empty_messages_encode_to_nothing() {
        assert!(relay::UnpublishReply {}.encode_to_vec().is_empty());
        assert!(directory::Ack {}.encode_to_vec().is_empty());
    }

    #[test]
    fn test_get_pubs_reply_keeps_order() {
        let reply = directory::GetPubsReply {
            pubs: vec![
                directory::PubInfo {
                    mid: "m1".to_string(),
                    ..Default::default()
                },
                directory::PubInfo {
                    mid: "m2".to_string(),
                    ..Default::default()
                },
            ],
        };

        let decoded = directory::GetPubsReply::decode(reply.encode_to_vec().as_slice()).unwrap();
        let mids: Vec<_> = decoded.pubs.iter().map(|p| p.mid.as_str()).collect();
        assert_eq!(mids, vec!["m1", "m2"]);
    }
}
