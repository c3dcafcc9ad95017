//! Command serialization
//!
//! Turns commands into the exact line the endpoint expects, without the
//! trailing terminator (the codec appends it when the line is written).

use std::fmt;
use url::form_urlencoded;

/// Field name that carries the function name in the structured form
const FUNCTION_FIELD: &str = "Function";

/// A single command to transmit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Raw command line, e.g. `tally` or `XMLTEXT vmix/inputs/input[1]`
    Raw(String),
    /// `FUNCTION <Name> key=value&...`
    Function(FunctionCommand),
}

/// Structured function call with ordered parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCommand {
    name: String,
    params: Vec<(String, String)>,
}

impl FunctionCommand {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter; insertion order is the wire order
    pub fn param<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Parameters as an ordered query string, `None` when there are none
    pub fn query_string(&self) -> Option<String> {
        let pairs: Vec<String> = self
            .params
            .iter()
            .filter(|(key, _)| key != FUNCTION_FIELD)
            .map(|(key, value)| format!("{}={}", form_encode(key), form_encode(value)))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("&"))
        }
    }
}

impl Command {
    /// Wire line for this command, without terminator
    pub fn to_line(&self) -> String {
        match self {
            Command::Raw(raw) => uppercase_verb(raw),
            Command::Function(function) => match function.query_string() {
                Some(query) => format!("FUNCTION {} {}", function.name, query),
                None => format!("FUNCTION {}", function.name),
            },
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

impl From<&str> for Command {
    fn from(raw: &str) -> Self {
        Command::Raw(raw.to_string())
    }
}

impl From<String> for Command {
    fn from(raw: String) -> Self {
        Command::Raw(raw)
    }
}

impl From<FunctionCommand> for Command {
    fn from(function: FunctionCommand) -> Self {
        Command::Function(function)
    }
}

/// One command or an ordered batch, accepted by `TcpClient::send`
pub trait IntoCommands {
    fn into_commands(self) -> Vec<Command>;
}

impl IntoCommands for Command {
    fn into_commands(self) -> Vec<Command> {
        vec![self]
    }
}

impl IntoCommands for FunctionCommand {
    fn into_commands(self) -> Vec<Command> {
        vec![self.into()]
    }
}

impl IntoCommands for &str {
    fn into_commands(self) -> Vec<Command> {
        vec![self.into()]
    }
}

impl IntoCommands for String {
    fn into_commands(self) -> Vec<Command> {
        vec![self.into()]
    }
}

impl<T: Into<Command>> IntoCommands for Vec<T> {
    fn into_commands(self) -> Vec<Command> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Command>, const N: usize> IntoCommands for [T; N] {
    fn into_commands(self) -> Vec<Command> {
        self.into_iter().map(Into::into).collect()
    }
}

/// Uppercase the first whitespace-delimited token only
fn uppercase_verb(raw: &str) -> String {
    match raw.find(char::is_whitespace) {
        Some(index) => {
            let (verb, rest) = raw.split_at(index);
            format!("{}{}", verb.to_uppercase(), rest)
        }
        None => raw.to_uppercase(),
    }
}

/// Form-encode a key or value; spaces become `%20`
fn form_encode(value: &str) -> String {
    // byte_serialize escapes a literal '+' as %2B, so every '+' left is a space
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
