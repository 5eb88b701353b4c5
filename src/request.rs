//! Request data model.
//!
//! A [`Request`] is created by BEGIN_REQUEST and filled from the PARAMS,
//! STDIN and DATA streams. Which streams must be terminated before the
//! request is ready depends on its role:
//!
//! | Role | Required streams |
//! |---|---|
//! | Responder | PARAMS, STDIN |
//! | Authorizer | PARAMS |
//! | Filter | PARAMS, STDIN, DATA |

use std::collections::{BTreeSet, HashMap};

use bytes::{Bytes, BytesMut};

use crate::protocol::{Body, NameValuePair, RecordType, Role};

/// Input stream kinds a request collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputStream {
    Params,
    Stdin,
    Data,
}

impl InputStream {
    /// Input stream carried by `body`, if any.
    pub fn of(body: &Body) -> Option<Self> {
        match body {
            Body::Params(_) => Some(Self::Params),
            Body::Stdin(_) => Some(Self::Stdin),
            Body::Data(_) => Some(Self::Data),
            _ => None,
        }
    }

    /// Record type carrying this stream.
    pub fn record_type(self) -> RecordType {
        match self {
            Self::Params => RecordType::Params,
            Self::Stdin => RecordType::Stdin,
            Self::Data => RecordType::Data,
        }
    }
}

/// Set of input streams still waiting for their terminator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSet(BTreeSet<InputStream>);

impl StreamSet {
    /// Streams a request with `role` must collect.
    pub fn for_role(role: Role) -> Self {
        let streams: &[InputStream] = match role {
            Role::Responder => &[InputStream::Params, InputStream::Stdin],
            Role::Authorizer => &[InputStream::Params],
            Role::Filter => &[InputStream::Params, InputStream::Stdin, InputStream::Data],
        };
        Self(streams.iter().copied().collect())
    }

    /// Check if `stream` is still open.
    #[inline]
    pub fn contains(&self, stream: InputStream) -> bool {
        self.0.contains(&stream)
    }

    /// Mark `stream` terminated. Returns `false` if it was not open.
    pub fn close(&mut self, stream: InputStream) -> bool {
        self.0.remove(&stream)
    }

    /// Check if every stream has been terminated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of open streams.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate open streams in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = InputStream> + '_ {
        self.0.iter().copied()
    }
}

/// Environment-like parameters sent in the PARAMS stream.
///
/// Later pairs overwrite earlier ones with the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<Bytes, Bytes>);

impl Params {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one pair.
    pub fn insert(&mut self, pair: NameValuePair) {
        self.0.insert(pair.name, pair.value);
    }

    /// Raw value for `name`.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.get_bytes(name.as_bytes())
    }

    /// Raw value for a raw `name`.
    pub fn get_bytes(&self, name: &[u8]) -> Option<&[u8]> {
        self.0.get(name).map(|v| &v[..])
    }

    /// Value for `name` if it is valid UTF-8.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Check if `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Bytes)> {
        self.0.iter()
    }
}

impl Extend<NameValuePair> for Params {
    fn extend<I: IntoIterator<Item = NameValuePair>>(&mut self, iter: I) {
        for pair in iter {
            self.insert(pair);
        }
    }
}

impl FromIterator<NameValuePair> for Params {
    fn from_iter<I: IntoIterator<Item = NameValuePair>>(iter: I) -> Self {
        let mut params = Params::new();
        params.extend(iter);
        params
    }
}

/// A request being collected or handed to the handler.
#[derive(Debug, Clone)]
pub struct Request {
    id: u16,
    role: Role,
    keep_alive: bool,
    params: Params,
    stdin: BytesMut,
    data: BytesMut,
    pending: StreamSet,
}

impl Request {
    /// Create a request with no input collected yet.
    pub fn new(id: u16, role: Role, keep_alive: bool) -> Self {
        Self {
            id,
            role,
            keep_alive,
            params: Params::new(),
            stdin: BytesMut::new(),
            data: BytesMut::new(),
            pending: StreamSet::for_role(role),
        }
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether the front end asked to keep the connection open.
    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Parameters collected from PARAMS.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Bytes collected from STDIN.
    pub fn stdin(&self) -> &[u8] {
        &self.stdin
    }

    /// Bytes collected from DATA (filter role only).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take ownership of the STDIN bytes.
    pub fn take_stdin(&mut self) -> Bytes {
        self.stdin.split().freeze()
    }

    /// Take ownership of the DATA bytes.
    pub fn take_data(&mut self) -> Bytes {
        self.data.split().freeze()
    }

    /// Streams still waiting for their terminator.
    pub fn pending_streams(&self) -> &StreamSet {
        &self.pending
    }

    /// Check if every required stream has been terminated.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply one input stream record.
    ///
    /// Returns `false` if the record was not consumed: it is not an input
    /// stream, or its stream is not required or already terminated.
    pub fn accept(&mut self, body: Body) -> bool {
        let stream = match InputStream::of(&body) {
            Some(stream) => stream,
            None => return false,
        };
        if !self.pending.contains(stream) {
            return false;
        }
        if body.is_end_of_stream() {
            return self.pending.close(stream);
        }

        match body {
            Body::Params(pairs) => self.params.extend(pairs),
            Body::Stdin(bytes) => self.stdin.extend_from_slice(&bytes),
            Body::Data(bytes) => self.data.extend_from_slice(&bytes),
            _ => return false,
        }
        true
    }
}
