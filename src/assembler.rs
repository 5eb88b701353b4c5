//! Per-connection request assembler.
//!
//! Pure state machine: it consumes decoded records and returns a [`Step`]
//! telling the driver what to do. It performs no I/O.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ BEGIN_REQUEST ┌───────┐ streams done ┌───────┐ start_response ┌────────────┐
//! │ Idle │──────────────>│ Begun │─────────────>│ Ready │───────────────>│ Responding │
//! └──────┘               └───────┘              └───────┘                └────────────┘
//!    ^                       │ ABORT_REQUEST                                   │
//!    │                       └────────────────────────────────────────────────>│
//!    │                          finish (keep-alive)                            │
//!    └─────────────────────────────────────────────────────────────────────────┤
//!                               finish (no keep-alive)      ┌────────┐         │
//!                                                           │ Closed │<────────┘
//!                                                           └────────┘
//! ```
//!
//! Management records (request id 0) are answered in every state without
//! a transition. Only one request is active at a time; a BEGIN_REQUEST
//! for another id while one is active is rejected with OVERLOADED.

use tracing::{debug, warn};

use crate::error::{FcgiError, Result};
use crate::management;
use crate::protocol::{Body, ProtocolStatus, Record, Role, MANAGEMENT_REQUEST_ID};
use crate::request::Request;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No active request.
    Idle,
    /// BEGIN_REQUEST seen, collecting input streams.
    Begun,
    /// Every required stream terminated; request handed out.
    Ready,
    /// Response is being written.
    Responding,
    /// Connection is done.
    Closed,
}

/// What the driver should do after a record has been applied.
#[derive(Debug)]
pub enum Step {
    /// Nothing to send; read the next record.
    Continue,
    /// Send this record now.
    Reply(Record),
    /// The active request is complete and must be handled.
    Ready(Request),
    /// The active request was aborted; send END_REQUEST, then `finish`.
    Aborted { request_id: u16, keep_alive: bool },
}

#[derive(Debug)]
enum State {
    Idle,
    Begun(Request),
    Ready { request_id: u16, keep_alive: bool },
    Responding { request_id: u16, keep_alive: bool },
    Closed,
}

/// Connection state machine with single-request capacity.
#[derive(Debug)]
pub struct Assembler {
    roles: Vec<Role>,
    state: State,
}

impl Assembler {
    /// Create an assembler accepting the given roles.
    pub fn new(roles: &[Role]) -> Self {
        Self {
            roles: roles.to_vec(),
            state: State::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        match self.state {
            State::Idle => ConnectionState::Idle,
            State::Begun(_) => ConnectionState::Begun,
            State::Ready { .. } => ConnectionState::Ready,
            State::Responding { .. } => ConnectionState::Responding,
            State::Closed => ConnectionState::Closed,
        }
    }

    /// Request being collected, if any.
    pub fn active(&self) -> Option<&Request> {
        match &self.state {
            State::Begun(request) => Some(request),
            _ => None,
        }
    }

    /// Apply one decoded record.
    pub fn apply(&mut self, record: Record) -> Step {
        let request_id = record.request_id;
        debug!(
            record_type = record.record_type(),
            request_id,
            state = ?self.state(),
            "applying record"
        );

        if request_id == MANAGEMENT_REQUEST_ID {
            return match management::answer(&record) {
                Some(reply) => Step::Reply(reply),
                None => Step::Continue,
            };
        }

        match record.body {
            Body::BeginRequest(begin) => self.begin(request_id, begin.role, begin.keep_alive()),
            Body::AbortRequest => self.abort(request_id),
            body @ (Body::Params(_) | Body::Stdin(_) | Body::Data(_)) => self.collect(request_id, body),
            body => {
                debug!(
                    record_type = body.record_type(),
                    request_id, "ignoring record"
                );
                Step::Continue
            }
        }
    }

    fn begin(&mut self, request_id: u16, role_code: u16, keep_alive: bool) -> Step {
        match &self.state {
            State::Idle => {}
            State::Begun(active) if active.id() == request_id => {
                warn!(request_id, "duplicate BEGIN_REQUEST for active request ignored");
                return Step::Continue;
            }
            State::Ready { request_id: active, .. } | State::Responding { request_id: active, .. }
                if *active == request_id =>
            {
                warn!(request_id, "duplicate BEGIN_REQUEST for request in flight ignored");
                return Step::Continue;
            }
            State::Closed => {
                debug!(request_id, "BEGIN_REQUEST on closed connection ignored");
                return Step::Continue;
            }
            State::Begun(_) | State::Ready { .. } | State::Responding { .. } => {
                warn!(request_id, "rejecting BEGIN_REQUEST: a request is already active");
                return Step::Reply(Record::end_request(
                    request_id,
                    0,
                    ProtocolStatus::Overloaded,
                ));
            }
        }

        let role = match Role::from_u16(role_code) {
            Some(role) if self.roles.contains(&role) => role,
            _ => {
                warn!(request_id, role = role_code, "rejecting BEGIN_REQUEST: unknown role");
                return Step::Reply(Record::end_request(
                    request_id,
                    0,
                    ProtocolStatus::UnknownRole,
                ));
            }
        };

        debug!(request_id, ?role, keep_alive, "request begun");
        self.state = State::Begun(Request::new(request_id, role, keep_alive));
        Step::Continue
    }

    fn abort(&mut self, request_id: u16) -> Step {
        let keep_alive = match &self.state {
            State::Begun(active) if active.id() == request_id => active.keep_alive(),
            _ => {
                debug!(request_id, "ABORT_REQUEST for inactive request ignored");
                return Step::Continue;
            }
        };

        debug!(request_id, "request aborted");
        self.state = State::Responding {
            request_id,
            keep_alive,
        };
        Step::Aborted {
            request_id,
            keep_alive,
        }
    }

    fn collect(&mut self, request_id: u16, body: Body) -> Step {
        let request = match &mut self.state {
            State::Begun(active) if active.id() == request_id => active,
            _ => {
                debug!(request_id, "stream record for inactive request ignored");
                return Step::Continue;
            }
        };

        let record_type = body.record_type();
        if !request.accept(body) {
            warn!(
                request_id,
                record_type, "stream record for a closed or unused stream ignored"
            );
            return Step::Continue;
        }
        if !request.is_ready() {
            return Step::Continue;
        }

        let keep_alive = request.keep_alive();
        match std::mem::replace(
            &mut self.state,
            State::Ready {
                request_id,
                keep_alive,
            },
        ) {
            State::Begun(request) => {
                debug!(request_id, "request ready");
                Step::Ready(request)
            }
            // Matched `Begun` above
            _ => Step::Continue,
        }
    }

    /// Move the ready request `request_id` into the responding state.
    ///
    /// On error the state is left unchanged.
    pub fn start_response(&mut self, request_id: u16) -> Result<()> {
        match self.state {
            State::Ready {
                request_id: ready,
                keep_alive,
            } if ready == request_id => {
                self.state = State::Responding {
                    request_id,
                    keep_alive,
                };
                Ok(())
            }
            State::Ready { request_id: ready, .. } => Err(FcgiError::Protocol(format!(
                "response for request {} but request {} is ready",
                request_id, ready
            ))),
            _ => Err(FcgiError::Protocol(format!(
                "cannot start a response in state {:?}",
                self.state()
            ))),
        }
    }

    /// Complete the response cycle.
    ///
    /// Returns whether the connection stays open: the assembler goes back
    /// to `Idle` if keep-alive was requested, otherwise to `Closed`.
    pub fn finish(&mut self) -> Result<bool> {
        match self.state {
            State::Responding { keep_alive, .. } => {
                self.state = if keep_alive {
                    State::Idle
                } else {
                    State::Closed
                };
                Ok(keep_alive)
            }
            _ => Err(FcgiError::Protocol(format!(
                "cannot finish a request in state {:?}",
                self.state()
            ))),
        }
    }

    /// Drop any in-flight request and mark the connection closed.
    pub fn close(&mut self) {
        self.state = State::Closed;
    }
}
