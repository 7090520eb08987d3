//! UCI command parsing.

use lucena_engine::{Position, TimeMs};

use crate::error::UciError;

/// Parameters for the `go` command.
///
/// All fields are optional; a bare `go` searches without limits.
#[derive(Debug, Clone, Default)]
pub struct GoParams {
    /// White's remaining clock in milliseconds.
    pub wtime: Option<TimeMs>,
    /// Black's remaining clock in milliseconds.
    pub btime: Option<TimeMs>,
    /// White's increment per move.
    pub winc: Option<TimeMs>,
    /// Black's increment per move.
    pub binc: Option<TimeMs>,
    /// Moves until the next time control.
    pub movestogo: Option<u32>,
    /// Search to this depth only.
    pub depth: Option<i32>,
    /// Search for exactly this many milliseconds.
    pub movetime: Option<TimeMs>,
    /// Search this many nodes only.
    pub nodes: Option<u64>,
    /// Restrict the root to these moves (UCI notation).
    pub search_moves: Vec<String>,
    /// Search until `stop`.
    pub infinite: bool,
}

/// A parsed UCI command.
#[derive(Debug)]
pub enum Command {
    /// `uci` -- identify the engine.
    Uci,
    /// `isready` -- synchronization ping.
    IsReady,
    /// `ucinewgame` -- reset engine state.
    UciNewGame,
    /// `setoption name <name> [value <value>]`.
    SetOption {
        /// Option name, lowercased.
        name: String,
        /// Option value, if given.
        value: Option<String>,
    },
    /// `position` -- set up a position with optional moves applied.
    Position(Position),
    /// `go` -- start searching with the given parameters.
    Go(GoParams),
    /// `stop` -- halt the current search.
    Stop,
    /// `quit` -- exit the engine.
    Quit,
    /// Unrecognized command (silently ignored per UCI convention).
    Unknown(String),
}

/// Parse a single line of UCI input into a [`Command`].
pub fn parse_command(line: &str) -> Result<Command, UciError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Command::Unknown(String::new()));
    }

    match tokens[0] {
        "uci" => Ok(Command::Uci),
        "isready" => Ok(Command::IsReady),
        "ucinewgame" => Ok(Command::UciNewGame),
        "stop" => Ok(Command::Stop),
        "quit" => Ok(Command::Quit),
        "setoption" => Ok(parse_setoption(&tokens[1..])),
        "position" => parse_position(&tokens[1..]),
        "go" => parse_go(&tokens[1..]),
        _ => Ok(Command::Unknown(tokens[0].to_string())),
    }
}

/// Parse `setoption name <name...> [value <value...>]`.
fn parse_setoption(tokens: &[&str]) -> Command {
    enum Section {
        Skip,
        Name,
        Value,
    }

    let mut name: Vec<&str> = Vec::new();
    let mut value: Vec<&str> = Vec::new();
    let mut section = Section::Skip;

    for &token in tokens {
        match token {
            "name" => section = Section::Name,
            "value" => section = Section::Value,
            other => match section {
                Section::Name => name.push(other),
                Section::Value => value.push(other),
                Section::Skip => {}
            },
        }
    }

    Command::SetOption {
        name: name.join(" ").to_lowercase(),
        value: if value.is_empty() {
            None
        } else {
            Some(value.join(" "))
        },
    }
}

/// Parse the `position` command arguments.
///
/// Supports:
/// - `position startpos [moves e2e4 d7d5 ...]`
/// - `position fen <fen-string> [moves e2e4 d7d5 ...]`
fn parse_position(tokens: &[&str]) -> Result<Command, UciError> {
    if tokens.is_empty() {
        return Err(UciError::MalformedPosition);
    }

    let (mut position, rest) = if tokens[0] == "startpos" {
        (Position::new(), &tokens[1..])
    } else if tokens[0] == "fen" {
        // FEN is 6 space-separated fields
        if tokens.len() < 7 {
            return Err(UciError::InvalidFen {
                fen: tokens[1..].join(" "),
            });
        }
        let fen = tokens[1..7].join(" ");
        let position = Position::from_fen(&fen).map_err(|_| UciError::InvalidFen {
            fen: fen.clone(),
        })?;
        (position, &tokens[7..])
    } else {
        return Err(UciError::MalformedPosition);
    };

    // Apply moves if present: "moves e2e4 d7d5 ..."
    if !rest.is_empty() && rest[0] == "moves" {
        for uci_str in &rest[1..] {
            let m = position
                .parse_uci_move(uci_str)
                .ok_or_else(|| UciError::InvalidMove {
                    uci_move: uci_str.to_string(),
                })?;
            position.do_move(m);
        }
    }

    Ok(Command::Position(position))
}

/// Parse the `go` command arguments.
///
/// Supports: wtime, btime, winc, binc, movestogo, depth, movetime,
/// nodes, searchmoves, infinite. Unknown tokens are silently skipped.
fn parse_go(tokens: &[&str]) -> Result<Command, UciError> {
    let mut params = GoParams::default();

    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "wtime" => {
                params.wtime = Some(parse_value(tokens.get(i + 1), "wtime")?);
                i += 2;
            }
            "btime" => {
                params.btime = Some(parse_value(tokens.get(i + 1), "btime")?);
                i += 2;
            }
            "winc" => {
                params.winc = Some(parse_value(tokens.get(i + 1), "winc")?);
                i += 2;
            }
            "binc" => {
                params.binc = Some(parse_value(tokens.get(i + 1), "binc")?);
                i += 2;
            }
            "movestogo" => {
                params.movestogo = Some(parse_value(tokens.get(i + 1), "movestogo")?);
                i += 2;
            }
            "depth" => {
                params.depth = Some(parse_value(tokens.get(i + 1), "depth")?);
                i += 2;
            }
            "movetime" => {
                params.movetime = Some(parse_value(tokens.get(i + 1), "movetime")?);
                i += 2;
            }
            "nodes" => {
                params.nodes = Some(parse_value(tokens.get(i + 1), "nodes")?);
                i += 2;
            }
            "searchmoves" => {
                // Every following token that looks like a move belongs here
                i += 1;
                while i < tokens.len() && looks_like_move(tokens[i]) {
                    params.search_moves.push(tokens[i].to_string());
                    i += 1;
                }
            }
            "infinite" => {
                params.infinite = true;
                i += 1;
            }
            _ => {
                // Unknown token -- skip per UCI convention
                i += 1;
            }
        }
    }

    Ok(Command::Go(params))
}

/// Coordinate-notation shape: "e2e4", optionally with a promotion piece.
fn looks_like_move(token: &str) -> bool {
    let bytes = token.as_bytes();
    (bytes.len() == 4 || bytes.len() == 5)
        && bytes[0].is_ascii_lowercase()
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_lowercase()
        && bytes[3].is_ascii_digit()
}

/// Parse one numeric `go` parameter value.
fn parse_value<T: std::str::FromStr>(token: Option<&&str>, param: &str) -> Result<T, UciError> {
    let value = token.ok_or_else(|| UciError::MissingGoValue {
        param: param.to_string(),
    })?;
    value.parse().map_err(|_| UciError::InvalidGoValue {
        param: param.to_string(),
        value: value.to_string(),
    })
}
