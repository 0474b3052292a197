//! The line Parser (§4.3): normalizes a raw UDP payload and classifies it
//! into a typed `GameEvent`, using `nom` combinators the way the teacher's
//! nearest analogue (a Source-engine demo/log toolkit) parses structured
//! text records.

mod tokens;

use chrono::Utc;
use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_until};
use nom::character::complete::{char, multispace0};
use nom::combinator::opt;
use nom::sequence::{delimited, preceded};
use nom::IResult;

use crate::error::ParseError;
use crate::store::{
    ChatData, ConnectData, DisconnectData, EventData, GameEvent, KillData, Meta,
    PlayerMeta, SuicideData, UNRESOLVED,
};
use crate::util::time::parse_log_timestamp;

use tokens::{player_token, PlayerToken};

const FRAMING: &[u8] = &[0xff, 0xff, 0xff, 0xff];

/// Strips optional Source-engine remote-log framing and leading whitespace,
/// returning the line starting at `"L "` — or `None` if that prefix is never found.
pub fn normalize(raw: &[u8]) -> Option<&str> {
    let mut bytes = raw;
    if bytes.starts_with(FRAMING) {
        bytes = &bytes[FRAMING.len()..];
        if let Some(rest) = bytes.strip_prefix(b"log ") {
            bytes = rest;
        }
    }
    let text = std::str::from_utf8(bytes).ok()?;
    let trimmed = text.trim_start();
    if trimmed.starts_with("L ") {
        Some(trimmed)
    } else {
        None
    }
}

fn player_meta(token: &PlayerToken) -> PlayerMeta {
    PlayerMeta {
        unique_id: token.unique_id(),
        name: token.sanitized_name(),
        is_bot: token.is_bot(),
    }
}

/// Parses the `L MM/DD/YYYY - HH:MM:SS: ` stamp, returning the remainder of the line.
fn strip_stamp(input: &str) -> IResult<&str, &str> {
    let (input, _) = tag("L ")(input)?;
    let (input, stamp) = take_until(": ")(input)?;
    let (input, _) = tag(": ")(input)?;
    Ok((input, stamp))
}

fn bracket_pos(input: &str) -> IResult<&str, (f32, f32, f32)> {
    let (input, body) = delimited(char('['), is_not("]"), char(']'))(input)?;
    let mut parts = body.split_whitespace();
    let x = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0.0);
    let y = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0.0);
    let z = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0.0);
    Ok((input, (x, y, z)))
}

fn optional_position(input: &str) -> (&str, Option<(f32, f32, f32)>) {
    let (input, _) = multispace0::<_, nom::error::Error<&str>>(input).unwrap_or((input, ""));
    match bracket_pos(input) {
        Ok((rest, pos)) => (rest, Some(pos)),
        Err(_) => (input, None),
    }
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), is_not("\""), char('"'))(input)
}

type KillPositions = (Option<(f32, f32, f32)>, Option<(f32, f32, f32)>);

fn parse_kill(body: &str) -> IResult<&str, (PlayerToken, PlayerToken, String, bool, KillPositions)> {
    let (rest, killer) = player_token(body)?;
    let (rest, killer_pos) = optional_position(rest);
    let (rest, _) = preceded(multispace0, tag("killed"))(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, victim) = player_token(rest)?;
    let (rest, victim_pos) = optional_position(rest);
    let (rest, _) = preceded(multispace0, tag("with"))(rest)?;
    let (rest, weapon) = preceded(multispace0, quoted)(rest)?;
    let headshot = rest.contains("(headshot)");
    Ok((
        rest,
        (killer, victim, weapon.to_string(), headshot, (killer_pos, victim_pos)),
    ))
}

fn parse_suicide(body: &str) -> IResult<&str, (PlayerToken, Option<String>)> {
    let (rest, player) = player_token(body)?;
    let (rest, _) = preceded(multispace0, tag("committed suicide"))(rest)?;
    let (rest, weapon) = opt(preceded(
        preceded(multispace0, tag("with")),
        preceded(multispace0, quoted),
    ))(rest)?;
    Ok((rest, (player, weapon.map(|w| w.to_string()))))
}

fn parse_connect(body: &str) -> IResult<&str, (PlayerToken, Option<std::net::IpAddr>)> {
    let (rest, player) = player_token(body)?;
    let (rest, _) = preceded(multispace0, tag("connected, address"))(rest)?;
    let (rest, addr) = preceded(multispace0, quoted)(rest)?;
    let ip = addr.split(':').next().and_then(|s| s.parse().ok());
    Ok((rest, (player, ip)))
}

fn parse_disconnect(body: &str) -> IResult<&str, (PlayerToken, Option<String>)> {
    let (rest, player) = player_token(body)?;
    let (rest, _) = preceded(multispace0, tag("disconnected"))(rest)?;
    let (rest, reason) = opt(preceded(
        preceded(multispace0, tag("(reason")),
        preceded(multispace0, quoted),
    ))(rest)?;
    Ok((rest, (player, reason.map(|r| r.to_string()))))
}

fn parse_chat(body: &str) -> IResult<&str, (PlayerToken, String, bool)> {
    let (rest, player) = player_token(body)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, kind) = alt((tag("say_team"), tag("say")))(rest)?;
    let (rest, message) = preceded(multispace0, quoted)(rest)?;
    let dead = kind == "say_team" || rest.contains("(dead)");
    Ok((rest, (player, message.to_string(), dead)))
}

fn parse_round_start(body: &str) -> IResult<&str, ()> {
    let (rest, _) = tag("World triggered ")(body)?;
    let (rest, what) = quoted(rest)?;
    if what != "Round_Start" {
        return Err(nom::Err::Error(nom::error::Error::new(
            rest,
            nom::error::ErrorKind::Tag,
        )));
    }
    Ok((rest, ()))
}

fn parse_round_end(body: &str) -> IResult<&str, (String, u32, String)> {
    let (rest, _) = tag("World triggered ")(body)?;
    let (rest, what) = quoted(rest)?;
    if what != "Round_End" {
        return Err(nom::Err::Error(nom::error::Error::new(
            rest,
            nom::error::ErrorKind::Tag,
        )));
    }
    let (rest, _) = preceded(multispace0, tag("team"))(rest)?;
    let (rest, team) = preceded(multispace0, quoted)(rest)?;
    let (rest, _) = preceded(multispace0, tag("duration"))(rest)?;
    let (rest, duration_raw) = preceded(multispace0, quoted)(rest)?;
    let (rest, _) = preceded(multispace0, tag("score"))(rest)?;
    let (rest, score) = preceded(multispace0, quoted)(rest)?;
    let duration = duration_raw.parse().unwrap_or(0);
    Ok((rest, (team.to_string(), duration, score.to_string())))
}

fn parse_map_change(body: &str) -> IResult<&str, (Option<String>, String, u32)> {
    let (rest, _) = tag("World triggered ")(body)?;
    let (rest, what) = quoted(rest)?;
    if what != "Map_Change" {
        return Err(nom::Err::Error(nom::error::Error::new(
            rest,
            nom::error::ErrorKind::Tag,
        )));
    }
    let (rest, previous) = opt(preceded(
        preceded(multispace0, tag("from")),
        preceded(multispace0, quoted),
    ))(rest)?;
    let (rest, _) = preceded(multispace0, tag("to"))(rest)?;
    let (rest, new_map) = preceded(multispace0, quoted)(rest)?;
    let (rest, count_raw) = opt(preceded(
        preceded(multispace0, tag("players")),
        preceded(multispace0, quoted),
    ))(rest)?;
    let count = count_raw.and_then(|c| c.parse().ok()).unwrap_or(0);
    Ok((rest, (previous.map(|p| p.to_string()), new_map.to_string(), count)))
}

fn parse_server_shutdown(body: &str) -> IResult<&str, ()> {
    let (rest, _) = tag("Server shutdown")(body)?;
    Ok((rest, ()))
}

fn parse_admin_action(body: &str) -> IResult<&str, String> {
    let (rest, _) = tag("Admin action ")(body)?;
    let (rest, description) = quoted(rest)?;
    Ok((rest, description.to_string()))
}

/// Parses a single normalized line into a `GameEvent` (§4.3).
///
/// Callers must pass the output of [`normalize`]; this function does not
/// itself strip framing.
pub fn parse(line: &str, server_id: crate::store::ServerId) -> Result<GameEvent, ParseError> {
    let (body, stamp) =
        strip_stamp(line).map_err(|_| ParseError::NotParseable)?;
    let timestamp = parse_log_timestamp(stamp).unwrap_or_else(Utc::now);

    let make = |data: EventData, meta: Option<Meta>| GameEvent {
        timestamp,
        server_id,
        raw: Some(line.to_string()),
        data,
        meta,
        map: String::new(),
    };

    if let Ok((_, (killer, victim, weapon, headshot, (killer_pos, victim_pos)))) = parse_kill(body) {
        let same_team = match (&killer.team, &victim.team) {
            (Some(a), Some(b)) => !a.is_empty() && a == b,
            _ => false,
        };
        let killer_meta = player_meta(&killer);
        let victim_meta = player_meta(&victim);
        let data = KillData {
            killer_id: UNRESOLVED,
            victim_id: UNRESOLVED,
            weapon,
            headshot,
            killer_team: killer.team.clone(),
            victim_team: victim.team.clone(),
            // The victim's position is where the kill happened; fall back to
            // the killer's when only one is present on the line.
            position: victim_pos.or(killer_pos),
        };
        let meta = Some(Meta::Dual {
            killer: killer_meta,
            victim: victim_meta,
        });
        let event_data = if same_team {
            EventData::Teamkill(data)
        } else {
            EventData::Kill(data)
        };
        return Ok(make(event_data, meta));
    }

    if let Ok((_, (player, ip))) = parse_connect(body) {
        let meta = Some(Meta::Single(player_meta(&player)));
        let data = EventData::Connect(ConnectData {
            player_id: UNRESOLVED,
            ip,
        });
        return Ok(make(data, meta));
    }

    if let Ok((_, (player, reason))) = parse_disconnect(body) {
        let meta = Some(Meta::Single(player_meta(&player)));
        let data = EventData::Disconnect(DisconnectData {
            player_id: UNRESOLVED,
            reason,
            session_duration: None,
        });
        return Ok(make(data, meta));
    }

    if let Ok((_, (player, _weapon))) = parse_suicide(body) {
        let meta = Some(Meta::Single(player_meta(&player)));
        let data = EventData::Suicide(SuicideData {
            player_id: UNRESOLVED,
        });
        return Ok(make(data, meta));
    }

    if let Ok((_, (player, message, dead))) = parse_chat(body) {
        let meta = Some(Meta::Single(player_meta(&player)));
        let data = EventData::Chat(ChatData {
            player_id: UNRESOLVED,
            message,
            message_mode: dead as u8,
        });
        return Ok(make(data, meta));
    }

    if parse_round_start(body).is_ok() {
        return Ok(make(EventData::RoundStart, None));
    }

    if let Ok((_, (winning_team, duration_secs, score))) = parse_round_end(body) {
        let data = EventData::RoundEnd(crate::store::RoundEndData {
            winning_team,
            duration_secs,
            score,
        });
        return Ok(make(data, None));
    }

    if let Ok((_, (previous_map, new_map, player_count))) = parse_map_change(body) {
        let data = EventData::MapChange(crate::store::MapChangeData {
            previous_map,
            new_map,
            player_count,
        });
        return Ok(make(data, None));
    }

    if parse_server_shutdown(body).is_ok() {
        return Ok(make(EventData::ServerShutdown, None));
    }

    if let Ok((_, description)) = parse_admin_action(body) {
        let data = EventData::AdminAction(crate::store::AdminActionData { description });
        return Ok(make(data, None));
    }

    Err(ParseError::Unrecognized(
        body.chars().take(80).collect::<String>(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ServerId;

    const SERVER: ServerId = 1;

    #[test]
    fn strips_source_engine_framing() {
        let mut raw = vec![0xff, 0xff, 0xff, 0xff];
        raw.extend_from_slice(b"log L 10/18/2023 - 20:15:22: World triggered \"Round_Start\"");
        let normalized = normalize(&raw).unwrap();
        assert!(normalized.starts_with("L "));
    }

    #[test]
    fn rejects_lines_without_l_prefix() {
        assert!(normalize(b"not a log line").is_none());
    }

    #[test]
    fn parses_connect_line() {
        let line = r#"L 10/18/2023 - 20:15:01: "TestPlayer<2><STEAM_1:0:12345><>" connected, address "192.168.1.100:27005""#;
        let event = parse(line, SERVER).unwrap();
        match event.data {
            EventData::Connect(ref c) => {
                assert_eq!(c.ip, Some("192.168.1.100".parse().unwrap()));
            }
            other => panic!("expected Connect, got {other:?}"),
        }
        match event.meta {
            Some(Meta::Single(ref m)) => {
                assert_eq!(m.name, "TestPlayer");
                assert_eq!(m.unique_id, "STEAM_1:0:12345");
                assert!(!m.is_bot);
            }
            other => panic!("expected Single meta, got {other:?}"),
        }
    }

    #[test]
    fn parses_kill_line_with_headshot() {
        let line = r#"L 10/18/2023 - 20:15:30: "Killer<2><STEAM_0:1:111><CT>" killed "Victim<3><STEAM_0:1:222><TERRORIST>" with "ak47" (headshot)"#;
        let event = parse(line, SERVER).unwrap();
        match event.data {
            EventData::Kill(ref k) => {
                assert_eq!(k.weapon, "ak47");
                assert!(k.headshot);
            }
            other => panic!("expected Kill, got {other:?}"),
        }
    }

    #[test]
    fn parses_kill_position_when_present() {
        let line = r#"L 10/18/2023 - 20:15:30: "Killer<2><STEAM_0:1:111><CT>" [100 200 50] killed "Victim<3><STEAM_0:1:222><TERRORIST>" [150 210 55] with "ak47""#;
        let event = parse(line, SERVER).unwrap();
        match event.data {
            EventData::Kill(ref k) => assert_eq!(k.position, Some((150.0, 210.0, 55.0))),
            other => panic!("expected Kill, got {other:?}"),
        }
    }

    #[test]
    fn kill_position_is_none_when_absent() {
        let line = r#"L 10/18/2023 - 20:15:30: "Killer<2><STEAM_0:1:111><CT>" killed "Victim<3><STEAM_0:1:222><TERRORIST>" with "ak47""#;
        let event = parse(line, SERVER).unwrap();
        match event.data {
            EventData::Kill(ref k) => assert_eq!(k.position, None),
            other => panic!("expected Kill, got {other:?}"),
        }
    }

    #[test]
    fn same_team_kill_classifies_as_teamkill() {
        let line = r#"L 10/18/2023 - 20:15:30: "Killer<2><STEAM_0:1:111><CT>" killed "Teammate<3><STEAM_0:1:222><CT>" with "ak47""#;
        let event = parse(line, SERVER).unwrap();
        assert!(matches!(event.data, EventData::Teamkill(_)));
    }

    #[test]
    fn parses_disconnect_with_reason() {
        let line = r#"L 10/18/2023 - 20:20:00: "TestPlayer<2><STEAM_1:0:12345><CT>" disconnected (reason "Disconnect by user")"#;
        let event = parse(line, SERVER).unwrap();
        match event.data {
            EventData::Disconnect(ref d) => {
                assert_eq!(d.reason.as_deref(), Some("Disconnect by user"));
            }
            other => panic!("expected Disconnect, got {other:?}"),
        }
    }

    #[test]
    fn parses_chat_message() {
        let line = r#"L 10/18/2023 - 20:20:30: "TestPlayer<2><STEAM_1:0:12345><CT>" say "gg""#;
        let event = parse(line, SERVER).unwrap();
        match event.data {
            EventData::Chat(ref c) => {
                assert_eq!(c.message, "gg");
                assert_eq!(c.message_mode, 0);
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn bot_steam_id_sets_is_bot() {
        let line = r#"L 10/18/2023 - 20:20:30: "BotPlayer<5><BOT><CT>" connected, address "0.0.0.0:0""#;
        let event = parse(line, SERVER).unwrap();
        match event.meta {
            Some(Meta::Single(ref m)) => assert!(m.is_bot),
            other => panic!("expected Single meta, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_shape_is_reported() {
        let line = "L 10/18/2023 - 20:20:30: something entirely unexpected";
        let err = parse(line, SERVER).unwrap_err();
        assert!(matches!(err, ParseError::Unrecognized(_)));
    }

    #[test]
    fn parser_is_idempotent_under_renormalization() {
        let line = r#"L 10/18/2023 - 20:15:01: "TestPlayer<2><STEAM_1:0:12345><>" connected, address "192.168.1.100:27005""#;
        let once = normalize(line.as_bytes()).unwrap();
        let twice = normalize(once.as_bytes()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(parse(once, SERVER).unwrap(), parse(twice, SERVER).unwrap());
    }

    #[test]
    fn parses_round_start_and_end() {
        let start = r#"L 10/18/2023 - 20:16:00: World triggered "Round_Start""#;
        let event = parse(start, SERVER).unwrap();
        assert!(matches!(event.data, EventData::RoundStart));

        let end = r#"L 10/18/2023 - 20:18:00: World triggered "Round_End" team "T" duration "120" score "1-0""#;
        let event = parse(end, SERVER).unwrap();
        match event.data {
            EventData::RoundEnd(ref r) => {
                assert_eq!(r.winning_team, "T");
                assert_eq!(r.duration_secs, 120);
            }
            other => panic!("expected RoundEnd, got {other:?}"),
        }
    }
}
