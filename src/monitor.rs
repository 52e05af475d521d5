// monitor.rs -- OOB status poller: infostring parsing and response diffing
//
// Ground: spec.md section 4.5. The teacher has no equivalent (myq2-client
// only ever plays as a participant, never polls a server as a spectListener
// like a master-server query tool would), so this module is grounded
// instead on the teacher's own `\key\value\...` userinfo parsing idiom
// (`cvar_userinfo`/`info_print` in myq2-common::common) applied to the
// inbound direction: split on backslash pairs instead of building one.

use std::collections::HashMap;

/// A `\key\value\...` info string, as carried on line 2 of a status reply.
pub type InfoString = HashMap<String, String>;

pub fn parse_info_string(s: &str) -> InfoString {
    let mut map = HashMap::new();
    let mut parts = s.trim_matches('\\').split('\\');
    while let (Some(key), Some(value)) = (parts.next(), parts.next()) {
        if !key.is_empty() {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEntry {
    pub score: i32,
    pub ping: i32,
    pub name: String,
}

/// Parses one `score ping "name"` line. Ground: the wire format spec.md
/// section 4.5 describes for status-response player table lines.
fn parse_player_line(line: &str) -> Option<PlayerEntry> {
    let line = line.trim();
    let first_quote = line.find('"')?;
    let last_quote = line.rfind('"')?;
    if last_quote <= first_quote {
        return None;
    }
    let name = line[first_quote + 1..last_quote].to_string();
    let mut head = line[..first_quote].trim().split_whitespace();
    let score = head.next()?.parse().ok()?;
    let ping = head.next()?.parse().ok()?;
    Some(PlayerEntry { score, ping, name })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusResponse {
    pub info: InfoString,
    pub players: Vec<PlayerEntry>,
}

/// Parses the body of an OOB `info`/status reply: line 1 is the literal
/// `print` echo (already stripped by `oob::parse`), line 2 is the info
/// string, remaining lines are the player table.
pub fn parse_status_response(body: &str) -> StatusResponse {
    let mut lines = body.lines();
    let info = lines.next().map(parse_info_string).unwrap_or_default();
    let players = lines.filter_map(parse_player_line).collect();
    StatusResponse { info, players }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    PlayerJoin { name: String },
    PlayerLeave { name: String },
    MapChange { previous_map: String, map: String },
}

/// Tracks the last polled status response and derives join/leave/map-change
/// events from consecutive polls (spec.md section 4.5: "diffing the last
/// two responses").
#[derive(Debug, Default)]
pub struct MonitorPoller {
    last: Option<StatusResponse>,
}

impl MonitorPoller {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Feeds a freshly parsed response and returns the events implied by
    /// the change from the previous one. The first response ever seen
    /// produces no events -- there is nothing to diff against yet.
    pub fn observe(&mut self, response: StatusResponse) -> Vec<MonitorEvent> {
        let mut events = Vec::new();

        if let Some(prev) = &self.last {
            let prev_map = prev.info.get("mapname").cloned().unwrap_or_default();
            let new_map = response.info.get("mapname").cloned().unwrap_or_default();
            if prev_map != new_map && !new_map.is_empty() {
                events.push(MonitorEvent::MapChange { previous_map: prev_map, map: new_map });
            }

            for p in &prev.players {
                if !response.players.iter().any(|n| n.name == p.name) {
                    events.push(MonitorEvent::PlayerLeave { name: p.name.clone() });
                }
            }
            for p in &response.players {
                if !prev.players.iter().any(|n| n.name == p.name) {
                    events.push(MonitorEvent::PlayerJoin { name: p.name.clone() });
                }
            }
        }

        self.last = Some(response);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_info_string_into_a_map() {
        let info = parse_info_string("\\hostname\\My Server\\mapname\\q2dm1\\maxclients\\8");
        assert_eq!(info.get("hostname").unwrap(), "My Server");
        assert_eq!(info.get("mapname").unwrap(), "q2dm1");
    }

    #[test]
    fn parses_player_table_line() {
        let entry = parse_player_line("17 42 \"Grunt\"").unwrap();
        assert_eq!(entry, PlayerEntry { score: 17, ping: 42, name: "Grunt".into() });
    }

    #[test]
    fn parse_status_response_round_trips_info_and_players() {
        let body = "\\hostname\\Server\\mapname\\q2dm1\n17 42 \"Grunt\"\n3 88 \"Spec\"\n";
        let status = parse_status_response(body);
        assert_eq!(status.info.get("mapname").unwrap(), "q2dm1");
        assert_eq!(status.players.len(), 2);
        assert_eq!(status.players[0].name, "Grunt");
    }

    #[test]
    fn first_observation_emits_no_events() {
        let mut mon = MonitorPoller::new();
        let status = parse_status_response("\\mapname\\q2dm1\n1 1 \"A\"\n");
        assert!(mon.observe(status).is_empty());
    }

    #[test]
    fn player_join_and_leave_are_detected() {
        let mut mon = MonitorPoller::new();
        mon.observe(parse_status_response("\\mapname\\q2dm1\n1 1 \"A\"\n"));
        let events = mon.observe(parse_status_response("\\mapname\\q2dm1\n1 1 \"B\"\n"));
        assert!(events.contains(&MonitorEvent::PlayerLeave { name: "A".into() }));
        assert!(events.contains(&MonitorEvent::PlayerJoin { name: "B".into() }));
    }

    #[test]
    fn map_change_is_detected() {
        let mut mon = MonitorPoller::new();
        mon.observe(parse_status_response("\\mapname\\q2dm1\n"));
        let events = mon.observe(parse_status_response("\\mapname\\q2dm2\n"));
        assert_eq!(
            events,
            vec![MonitorEvent::MapChange { previous_map: "q2dm1".into(), map: "q2dm2".into() }]
        );
    }
}
