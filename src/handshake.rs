// handshake.rs -- connection state machine: challenge, connect, precache, spawn
//
// Ground: myq2-client::cl_main.rs's ConnState enum and its
// cl_send_connect_packet/cl_check_for_resend functions, which drive the
// same challenge -> connect -> spawn progression from global `CLS` state.
// Here the same transitions are expressed as methods on an owned
// `Handshake` value (spec.md section 9's "instance state, not globals"),
// and extended with the stufftext-driven configstrings/baselines/precache
// exchange and the reconnect policy that spec.md section 4.4 specifies
// in full -- the teacher's vanilla-only client never needed to parse
// `\x7Fc version`/`\x7Fc actoken` stufftext or hold a pending reliable
// command queue, since it always has a live player issuing commands.

use std::collections::VecDeque;

use crate::config::ClientConfig;
use crate::oob::{self, OobCommand};
use crate::protocol::ProtocolVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Disconnected,
    Challenging,
    Connecting,
    Connected,
    Handshaking,
    Spawned,
    Reconnecting,
}

const BEGIN_DELAY_MS: u64 = 500;
const RECONNECT_DELAY_MS: u64 = 500;

/// Drives one connection attempt's handshake. Owns the pending reliable
/// command queue and the timers for the delayed `begin`/reconnect steps;
/// does not itself touch a socket -- callers drain `Vec<u8>` datagrams and
/// `String` reliable bodies and send them however they see fit.
pub struct Handshake {
    player_name: String,
    passive_mode: bool,
    max_reconnect_attempts: u32,
    qport: u16,

    state: HandshakeState,
    protocol: Option<ProtocolVersion>,
    challenge: i32,
    spawn_count: i32,

    pending: VecDeque<String>,
    begin_due_at_ms: Option<u64>,
    reconnect_due_at_ms: Option<u64>,
    reconnect_attempt: u32,

    sent_version: bool,
    sent_actoken: bool,
}

impl Handshake {
    pub fn new(config: &ClientConfig, qport: u16) -> Self {
        Self {
            player_name: config.player_name.clone(),
            passive_mode: config.passive_mode,
            max_reconnect_attempts: config.max_reconnect_attempts,
            qport,
            state: HandshakeState::Disconnected,
            protocol: None,
            challenge: 0,
            spawn_count: 0,
            pending: VecDeque::new(),
            begin_due_at_ms: None,
            reconnect_due_at_ms: None,
            reconnect_attempt: 0,
            sent_version: false,
            sent_actoken: false,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn protocol(&self) -> Option<ProtocolVersion> {
        self.protocol
    }

    /// `\key\value\...` string sent with the connect command. Ground:
    /// `cvar_userinfo` -- this crate has no cvar subsystem, so the fixed
    /// spectator-client fields it always sends are written directly.
    pub fn build_userinfo(&self) -> String {
        format!(
            "\\name\\{}\\skin\\male/grunt\\rate\\25000\\msg\\1\\hand\\2\\fov\\90\\spectator\\1",
            self.player_name
        )
    }

    /// Begins a connection attempt: getchallenge OOB datagram, DISCONNECTED -> CHALLENGING.
    pub fn start_connect(&mut self) -> Vec<u8> {
        self.state = HandshakeState::Challenging;
        oob::build_getchallenge()
    }

    /// Handles a parsed out-of-band command. Returns an outgoing OOB
    /// datagram when the transition produces one (the `connect` request).
    pub fn handle_oob(&mut self, cmd: &OobCommand) -> Option<Vec<u8>> {
        match (self.state, cmd) {
            (
                HandshakeState::Challenging,
                OobCommand::Challenge { challenge, offered_protocols },
            ) => {
                let protocol = ProtocolVersion::pick_best(offered_protocols).unwrap_or(ProtocolVersion::Vanilla);
                self.protocol = Some(protocol);
                self.challenge = *challenge;
                self.state = HandshakeState::Connecting;
                Some(oob::build_connect(protocol, self.qport, *challenge, &self.build_userinfo()))
            }
            (HandshakeState::Connecting, OobCommand::ClientConnect) => {
                self.state = HandshakeState::Connected;
                None
            }
            _ => None,
        }
    }

    /// Parses a server stufftext body and applies the transitions from
    /// spec.md section 4.4's table. `now_ms` seeds the delayed-`begin` and
    /// delayed-reconnect timers.
    pub fn handle_stufftext(&mut self, text: &str, now_ms: u64) {
        let text = text.trim();

        if text == "reconnect" {
            self.begin_reconnect(now_ms);
            return;
        }

        if let Some(rest) = text.strip_prefix("cmd configstrings ") {
            self.state = HandshakeState::Handshaking;
            self.pending.push_back(format!("configstrings {rest}"));
            return;
        }

        if let Some(rest) = text.strip_prefix("cmd baselines ") {
            self.state = HandshakeState::Handshaking;
            self.pending.push_back(format!("baselines {rest}"));
            return;
        }

        if text.contains("\x7Fc version $version") && !self.sent_version {
            self.sent_version = true;
            self.pending.push_back("\x7Fc version q2-spectator-client 1.0".to_string());
            return;
        }

        if text.contains("\x7Fc actoken $actoken") && !self.sent_actoken {
            self.sent_actoken = true;
            self.pending.push_back("\x7Fc actoken 0".to_string());
            return;
        }

        if let Some(rest) = text.strip_prefix("precache") {
            let n: i32 = rest.trim().parse().unwrap_or(0);
            self.spawn_count = n;
            self.on_precache(now_ms);
            return;
        }

        if text.starts_with("skins") {
            self.on_precache(now_ms);
        }
    }

    fn on_precache(&mut self, now_ms: u64) {
        if self.passive_mode {
            self.state = HandshakeState::Spawned;
            return;
        }
        self.begin_due_at_ms = Some(now_ms + BEGIN_DELAY_MS);
    }

    fn begin_reconnect(&mut self, now_ms: u64) {
        self.state = HandshakeState::Reconnecting;
        self.protocol = None;
        self.pending.clear();
        self.begin_due_at_ms = None;
        self.sent_version = false;
        self.sent_actoken = false;
        self.reconnect_due_at_ms = Some(now_ms + RECONNECT_DELAY_MS);
    }

    /// Called on SVC_DISCONNECT / OOB `disconnect` at any state. Applies
    /// the exponential backoff policy: `min(5s * attempt, 30s)`, capped at
    /// `max_reconnect_attempts`.
    pub fn note_disconnect(&mut self, now_ms: u64) -> Result<(), u32> {
        self.reconnect_attempt += 1;
        if self.reconnect_attempt > self.max_reconnect_attempts {
            self.state = HandshakeState::Disconnected;
            return Err(self.reconnect_attempt - 1);
        }
        let backoff_ms = (5_000u64 * self.reconnect_attempt as u64).min(30_000);
        self.begin_reconnect(now_ms.saturating_sub(RECONNECT_DELAY_MS) + backoff_ms);
        Ok(())
    }

    /// True once a reconnect attempt's backoff has elapsed and a fresh
    /// `getchallenge` should be sent.
    pub fn reconnect_due(&self, now_ms: u64) -> bool {
        matches!(self.state, HandshakeState::Reconnecting)
            && self.reconnect_due_at_ms.map_or(false, |t| now_ms >= t)
    }

    /// Called when SERVERDATA arrives for a map different from the one
    /// currently loaded while SPAWNED. Keeps the netchan/protocol but
    /// resets the precache/pending-command bookkeeping and re-requests
    /// the `new` handshake.
    pub fn on_map_change(&mut self) {
        self.state = HandshakeState::Handshaking;
        self.pending.clear();
        self.sent_version = false;
        self.sent_actoken = false;
        self.begin_due_at_ms = None;
    }

    /// Pops the next reliable command body due to be sent, FIFO. The
    /// `begin <spawn_count>` command is held out of band until the queue
    /// has fully drained and its own delay has elapsed, per spec.md
    /// section 4.4's "flush pending-queue, then after 500ms send begin".
    pub fn next_reliable_command(&mut self, now_ms: u64) -> Option<String> {
        if let Some(cmd) = self.pending.pop_front() {
            return Some(cmd);
        }
        if let Some(due) = self.begin_due_at_ms {
            if now_ms >= due {
                self.begin_due_at_ms = None;
                self.state = HandshakeState::Spawned;
                return Some(format!("begin {}", self.spawn_count));
            }
        }
        None
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.begin_due_at_ms.is_some()
    }
}
