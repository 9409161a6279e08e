use anyhow::{Result, anyhow, bail};

/// One line of console input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Select(usize),
    Insert(String),
    Remove(String),
    Move { uid: String, index: usize },
    Set { uid: String, property: String, value: String },
    Type { uid: String, text: String },
    Fields(String),
    Export,
    Help,
    Quit,
}

pub const HELP: &str = "\
list                          show every block
select <n>                    select the n-th block (1-based)
insert <type>                 insert a default block after the selection
remove <uid>                  remove a block
move <uid> <index>            move a block (0-based index)
set <uid> <property> <value>  set a property
type <uid> <text>             append text to a block
fields <uid>                  show the editable properties of a block
export                        print the document as markup
quit";

impl Command {
    /// Parse one input line; blank lines give `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        let command = match name {
            "" => return Ok(None),
            "list" | "ls" => Command::List,
            "select" => Command::Select(number(rest, "select <n>")?),
            "insert" => Command::Insert(word(rest, "insert <type>")?),
            "remove" | "rm" => Command::Remove(word(rest, "remove <uid>")?),
            "move" => {
                let (uid, index) = split(rest, "move <uid> <index>")?;
                Command::Move {
                    uid,
                    index: number(&index, "move <uid> <index>")?,
                }
            }
            "set" => {
                let (uid, rest) = split(rest, "set <uid> <property> <value>")?;
                let (property, value) = rest
                    .split_once(char::is_whitespace)
                    .map(|(property, value)| (property.to_string(), value.trim().to_string()))
                    .unwrap_or_else(|| (rest.clone(), String::new()));
                Command::Set {
                    uid,
                    property,
                    value,
                }
            }
            "type" => {
                let (uid, text) = split(rest, "type <uid> <text>")?;
                Command::Type { uid, text }
            }
            "fields" => Command::Fields(word(rest, "fields <uid>")?),
            "export" => Command::Export,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => bail!("unknown command {other:?}, try `help`"),
        };
        Ok(Some(command))
    }
}

fn word(rest: &str, usage: &str) -> Result<String> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        bail!("usage: {usage}");
    }
    Ok(rest.to_string())
}

fn number(rest: &str, usage: &str) -> Result<usize> {
    rest.parse().map_err(|_| anyhow!("usage: {usage}"))
}

fn split(rest: &str, usage: &str) -> Result<(String, String)> {
    rest.split_once(char::is_whitespace)
        .map(|(head, tail)| (head.to_string(), tail.trim().to_string()))
        .ok_or_else(|| anyhow!("usage: {usage}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("list", Command::List)]
    #[case("  select 2 ", Command::Select(2))]
    #[case("insert image", Command::Insert("image".into()))]
    #[case("move b1 0", Command::Move { uid: "b1".into(), index: 0 })]
    #[case("set b2 align right", Command::Set { uid: "b2".into(), property: "align".into(), value: "right".into() })]
    #[case("set b2 alt a grey cat", Command::Set { uid: "b2".into(), property: "alt".into(), value: "a grey cat".into() })]
    #[case("set b2 alt", Command::Set { uid: "b2".into(), property: "alt".into(), value: String::new() })]
    #[case("type b1 hello there", Command::Type { uid: "b1".into(), text: "hello there".into() })]
    #[case("q", Command::Quit)]
    fn test_parse(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(Command::parse(line).unwrap(), Some(expected));
    }

    #[rstest]
    #[case("select two")]
    #[case("insert")]
    #[case("move b1")]
    #[case("frobnicate")]
    fn test_parse_errors(#[case] line: &str) {
        assert!(Command::parse(line).is_err());
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(Command::parse("   ").unwrap(), None);
    }
}
