//! Property-based tests for the record layer and request assembly.
//!
//! These tests use proptest to verify invariants hold for all inputs:
//! - Every encoded record is a multiple of 8 bytes
//! - Records and name-value pairs decode back to what was encoded
//! - Length prefixes switch form exactly at 128
//! - Arbitrary input never panics the parser or the assembler

use bytes::{Bytes, BytesMut};
use fcgi_worker::protocol::{
    decode_length, decode_pairs, encode_length, encode_pairs, padding_for, Body, Header,
    NameValuePair, Record, RecordBuffer, RecordType, HEADER_SIZE, MAX_SHORT_LENGTH,
};
use fcgi_worker::{Assembler, ConnectionState, Role, Step};
use proptest::prelude::*;

// Strategy for generating name-value pairs with short and long lengths
fn pair_strategy() -> impl Strategy<Value = NameValuePair> {
    (
        prop::collection::vec(any::<u8>(), 0..300),
        prop::collection::vec(any::<u8>(), 0..300),
    )
        .prop_map(|(name, value)| NameValuePair::new(name, value))
}

// Strategy for generating encodable records
fn record_strategy() -> impl Strategy<Value = Record> {
    let id = 1u16..=u16::MAX;
    prop_oneof![
        (id.clone(), prop::collection::vec(any::<u8>(), 0..2000))
            .prop_map(|(id, data)| Record::new(id, Body::Stdin(Bytes::from(data)))),
        (id.clone(), prop::collection::vec(any::<u8>(), 0..2000))
            .prop_map(|(id, data)| Record::new(id, Body::Stdout(Bytes::from(data)))),
        (id.clone(), prop::collection::vec(pair_strategy(), 0..8))
            .prop_map(|(id, pairs)| Record::new(id, Body::Params(pairs))),
        (id.clone(), any::<bool>())
            .prop_map(|(id, keep)| Record::begin_request(id, Role::Responder, keep)),
        id.prop_map(|id| Record::new(id, Body::AbortRequest)),
    ]
}

#[test]
fn prop_padding_aligns_every_length() {
    proptest!(|(len in 0u16..=u16::MAX)| {
        let padding = padding_for(len as usize);
        prop_assert!(padding < 8);
        prop_assert_eq!((HEADER_SIZE + len as usize + padding as usize) % 8, 0);

        let header = Header::new(RecordType::Stdout.code(), 1, len);
        prop_assert_eq!(header.padding_length, padding);
    });
}

#[test]
fn prop_record_survives_the_wire() {
    proptest!(|(record in record_strategy())| {
        let wire = record.encode().unwrap();
        prop_assert_eq!(wire.len() % 8, 0);

        let mut buffer = RecordBuffer::new();
        let decoded = buffer.push(&wire).unwrap();
        prop_assert_eq!(decoded, vec![record]);
        prop_assert!(buffer.is_empty());
    });
}

#[test]
fn prop_records_split_at_any_point() {
    proptest!(|(records in prop::collection::vec(record_strategy(), 1..6), split in any::<prop::sample::Index>())| {
        let mut wire = BytesMut::new();
        for record in &records {
            record.encode_into(&mut wire).unwrap();
        }
        let at = split.index(wire.len() + 1);

        let mut buffer = RecordBuffer::new();
        let mut decoded = buffer.push(&wire[..at]).unwrap();
        decoded.extend(buffer.push(&wire[at..]).unwrap());
        prop_assert_eq!(decoded, records);
    });
}

#[test]
fn prop_pairs_round_trip() {
    proptest!(|(pairs in prop::collection::vec(pair_strategy(), 0..16))| {
        let mut buf = BytesMut::new();
        encode_pairs(&pairs, &mut buf);
        let decoded = decode_pairs(&buf.freeze()).unwrap();
        prop_assert_eq!(decoded, pairs);
    });
}

#[test]
fn prop_length_form_boundary() {
    proptest!(|(len in 0usize..=100_000)| {
        let mut buf = BytesMut::new();
        encode_length(len, &mut buf);
        if len <= MAX_SHORT_LENGTH {
            prop_assert_eq!(buf.len(), 1);
            prop_assert!(buf[0] & 0x80 == 0);
        } else {
            prop_assert_eq!(buf.len(), 4);
            prop_assert!(buf[0] & 0x80 != 0);
        }

        let mut offset = 0;
        prop_assert_eq!(decode_length(&buf, &mut offset).unwrap(), len);
        prop_assert_eq!(offset, buf.len());
    });
}

#[test]
fn prop_parser_never_panics() {
    proptest!(|(data in prop::collection::vec(any::<u8>(), 0..512))| {
        let mut buffer = RecordBuffer::new();
        // Errors are fine, panics are not
        let _ = buffer.push(&data);
    });
}

#[test]
fn prop_overload_never_disturbs_active_request() {
    proptest!(|(active in 1u16..=1000, other in 1001u16..=2000, stdin in prop::collection::vec(any::<u8>(), 1..200))| {
        let mut asm = Assembler::new(&Role::ALL);
        asm.apply(Record::begin_request(active, Role::Responder, false));
        asm.apply(Record::new(active, Body::Stdin(Bytes::from(stdin.clone()))));

        let step = asm.apply(Record::begin_request(other, Role::Responder, false));
        prop_assert!(matches!(step, Step::Reply(_)));
        prop_assert_eq!(asm.state(), ConnectionState::Begun);

        asm.apply(Record::new(active, Body::Params(vec![])));
        match asm.apply(Record::new(active, Body::Stdin(Bytes::new()))) {
            Step::Ready(request) => {
                prop_assert_eq!(request.id(), active);
                prop_assert_eq!(request.stdin(), &stdin[..]);
            }
            step => prop_assert!(false, "expected ready, got {:?}", step),
        }
    });
}
