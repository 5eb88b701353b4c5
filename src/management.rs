//! Management records (request id 0).
//!
//! GET_VALUES is answered from a fixed capability table. The worker runs
//! one request per connection and one connection at a time, and says so:
//!
//! | Name | Value |
//! |---|---|
//! | `FCGI_MAX_CONNS` | `1` |
//! | `FCGI_MAX_REQS` | `1` |
//! | `FCGI_MPXS_CONNS` | `0` |
//!
//! Every other management record gets UNKNOWN_TYPE back.

use bytes::Bytes;

use crate::protocol::{Body, NameValuePair, Record, MANAGEMENT_REQUEST_ID};

/// Maximum concurrent transport connections.
pub const MAX_CONNS: usize = 1;

/// Maximum concurrent requests across all connections.
pub const MAX_REQS: usize = 1;

/// Whether requests are multiplexed over one connection.
pub const MPXS_CONNS: bool = false;

pub const FCGI_MAX_CONNS: &str = "FCGI_MAX_CONNS";
pub const FCGI_MAX_REQS: &str = "FCGI_MAX_REQS";
pub const FCGI_MPXS_CONNS: &str = "FCGI_MPXS_CONNS";

/// Advertised value for a capability name, `None` if unknown.
pub fn capability(name: &[u8]) -> Option<Bytes> {
    let value = match name {
        n if n == FCGI_MAX_CONNS.as_bytes() => MAX_CONNS.to_string(),
        n if n == FCGI_MAX_REQS.as_bytes() => MAX_REQS.to_string(),
        n if n == FCGI_MPXS_CONNS.as_bytes() => u8::from(MPXS_CONNS).to_string(),
        _ => return None,
    };
    Some(Bytes::from(value))
}

/// Answer pairs for a GET_VALUES query.
///
/// Only names that were asked for and are known appear, in query order,
/// each at most once.
pub fn get_values(query: &[NameValuePair]) -> Vec<NameValuePair> {
    let mut answer: Vec<NameValuePair> = Vec::with_capacity(query.len());
    for pair in query {
        if answer.iter().any(|a| a.name == pair.name) {
            continue;
        }
        if let Some(value) = capability(&pair.name) {
            answer.push(NameValuePair {
                name: pair.name.clone(),
                value,
            });
        }
    }
    answer
}

/// Reply to a management record.
///
/// Returns `None` for records that need no reply (a front end never sends
/// GET_VALUES_RESULT or UNKNOWN_TYPE, and replying to them could loop).
pub fn answer(record: &Record) -> Option<Record> {
    let body = match &record.body {
        Body::GetValues(query) => Body::GetValuesResult(get_values(query)),
        Body::GetValuesResult(_) | Body::UnknownType(_) => return None,
        other => Body::UnknownType(other.record_type()),
    };
    Some(Record::new(MANAGEMENT_REQUEST_ID, body))
}
