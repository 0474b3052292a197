//! The quoted player token: `"<name><uid><steamId|BOT><team>"` (§4.3).

use nom::bytes::complete::{is_not, take_until};
use nom::character::complete::char;
use nom::multi::many1;
use nom::sequence::delimited;
use nom::IResult;

/// A decoded player token, still carrying the raw (unsanitized) name and the
/// raw steam-id-or-BOT field.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerToken {
    raw_name: String,
    pub uid: String,
    pub steam_id: String,
    pub team: Option<String>,
}

impl PlayerToken {
    /// §4.3: names are sanitized by removing `<`/`>` and truncating to 255 bytes
    pub fn sanitized_name(&self) -> String {
        let cleaned: String = self.raw_name.chars().filter(|c| *c != '<' && *c != '>').collect();
        if cleaned.len() > 255 {
            cleaned.chars().take(255).collect()
        } else {
            cleaned
        }
    }

    /// §4.3: `isBot` iff steamId equals "BOT" (case-insensitive) or begins with "BOT_"
    pub fn is_bot(&self) -> bool {
        let upper = self.steam_id.to_ascii_uppercase();
        upper == "BOT" || upper.starts_with("BOT_")
    }

    /// §3 PlayerUniqueId: bots get a synthetic id derived from the sanitized name
    pub fn unique_id(&self) -> String {
        if self.is_bot() {
            let name = self.sanitized_name();
            let synthetic: String = name
                .trim()
                .chars()
                .map(|c| if c.is_whitespace() { '_' } else { c })
                .collect();
            format!("BOT_{}", synthetic.to_ascii_uppercase())
        } else {
            self.steam_id.clone()
        }
    }
}

fn bracket_group(input: &str) -> IResult<&str, &str> {
    delimited(char('<'), is_not("<>"), char('>'))(input)
}

fn token_body(input: &str) -> IResult<&str, PlayerToken> {
    let (input, raw_name) = take_until("<")(input)?;
    let (input, groups) = many1(bracket_group)(input)?;

    let uid = groups.first().copied().unwrap_or("").to_string();
    let steam_id = groups.get(1).copied().unwrap_or("").to_string();
    let team = groups.get(2).map(|t| t.to_string()).filter(|t| !t.is_empty());

    Ok((
        input,
        PlayerToken {
            raw_name: raw_name.to_string(),
            uid,
            steam_id,
            team,
        },
    ))
}

/// Parses a full quoted player token, e.g. `"Name<2><STEAM_0:1:111><CT>"`.
pub fn player_token(input: &str) -> IResult<&str, PlayerToken> {
    delimited(char('"'), token_body, char('"'))(input)
}
