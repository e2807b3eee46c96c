// * round-trip for arbitrary payloads and frame sizes
// * terminator inside the payload truncates at the first match
// * short trailing frame is embedded, not dropped
// * carrier bytes past the envelope are untouched

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use stego_core::constants::PAYLOAD_TERMINATOR;
    use stego_core::stego::{
        embed_stream, extract_stream, BitEmbedder, BitExtractor, FrameTransform, PayloadEnvelope, StegoError,
    };

    // ------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------
    fn embed(carrier: &[u8], payload: &[u8], frame_bytes: usize) -> Result<Vec<u8>, StegoError> {
        let mut embedder = BitEmbedder::new(PayloadEnvelope::new(payload));
        let mut out = Vec::with_capacity(carrier.len());
        embed_stream(&mut &carrier[..], &mut out, &mut embedder, frame_bytes)?;
        Ok(out)
    }

    fn noise(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(37).wrapping_add(seed)).collect()
    }

    // ------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------
    #[test]
    fn embed_then_extract_returns_payload() {
        let payload = b"eight by";
        let carrier = noise(16 * 64, 3);
        let stego = embed(&carrier, payload, 64).unwrap();
        assert_eq!(stego.len(), carrier.len());
        assert_eq!(extract_stream(&mut stego.as_slice(), 100).unwrap(), payload);
    }

    #[test]
    fn bytes_after_envelope_pass_through() {
        let payload = b"abc";
        let carrier = noise(4096, 9);
        let stego = embed(&carrier, payload, 1000).unwrap();
        let used = (payload.len() + PAYLOAD_TERMINATOR.len()) * 8;
        assert_eq!(&stego[used..], &carrier[used..]);
        for (a, b) in stego[..used].iter().zip(&carrier[..used]) {
            assert_eq!(a & 0xFE, b & 0xFE);
        }
    }

    #[test]
    fn short_tail_frame_is_embedded() {
        // Two 40-byte frames then a 32-byte tail; the envelope ends in the tail.
        let payload = [0xFFu8; 2];
        let envelope_bits = (payload.len() + PAYLOAD_TERMINATOR.len()) * 8;
        let carrier = vec![0u8; envelope_bits];
        let stego = embed(&carrier, &payload, 40).unwrap();
        assert_eq!(extract_stream(&mut stego.as_slice(), 7).unwrap(), payload);
    }

    #[test]
    fn carrier_one_byte_too_short_is_rejected() {
        let payload = [1u8; 4];
        let envelope_bits = (payload.len() + PAYLOAD_TERMINATOR.len()) * 8;
        let carrier = vec![0u8; envelope_bits - 1];
        assert!(matches!(embed(&carrier, &payload, 16), Err(StegoError::CapacityExceeded { .. })));
    }

    #[test]
    fn extractor_state_survives_odd_chunking() {
        let payload = b"chunk boundaries";
        let stego = embed(&noise(2048, 1), payload, 333).unwrap();
        let mut extractor = BitExtractor::new();
        let mut found = false;
        for chunk in stego.chunks(3) {
            if extractor.push(chunk).is_some() {
                found = true;
                break;
            }
        }
        assert!(found);
        assert_eq!(extractor.into_payload().unwrap(), payload);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            payload in proptest::collection::vec(any::<u8>(), 0..96),
            frame_bytes in 1usize..512,
            slack in 0usize..300,
            seed in any::<u8>(),
        ) {
            // Payloads built from these bytes cannot contain the terminator.
            let payload: Vec<u8> = payload.into_iter().map(|b| b & 0x3F).collect();
            let needed = (payload.len() + PAYLOAD_TERMINATOR.len()) * 8;
            let carrier = noise(needed + slack, seed);

            let stego = embed(&carrier, &payload, frame_bytes).unwrap();
            prop_assert_eq!(stego.len(), carrier.len());
            let recovered = extract_stream(&mut stego.as_slice(), frame_bytes).unwrap();
            prop_assert_eq!(recovered, payload);
        }

        #[test]
        fn prop_terminator_inside_payload_truncates(
            head in proptest::collection::vec(0u8..0x40, 0..32),
            tail in proptest::collection::vec(0u8..0x40, 1..32),
        ) {
            let mut payload = head.clone();
            payload.extend_from_slice(PAYLOAD_TERMINATOR);
            payload.extend_from_slice(&tail);
            let needed = (payload.len() + PAYLOAD_TERMINATOR.len()) * 8;

            let stego = embed(&vec![0u8; needed], &payload, 64).unwrap();
            let recovered = extract_stream(&mut stego.as_slice(), 64).unwrap();
            prop_assert_eq!(recovered, head);
        }
    }
}
