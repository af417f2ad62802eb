use crate::session::Event;

pub const HELP: &str = "\
commands:
  login <user> <password>   start the session
  list [filter]             trucks whose key contains filter
  select <key | id>         show one truck, e.g. `select C-007`
  back                      return to the fleet list
  live                      toggle live monitoring of the selected truck
  reset                     regenerate the selected truck's history
  show                      print the selected truck again
  metrics                   print counters
  quit";

/// One line typed at the dashboard prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Event(Event),
    List(String),
    Show,
    Metrics,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_lowercase().as_str() {
        "login" => {
            let mut parts = rest.split_whitespace();
            let user = parts.next().unwrap_or_default().to_string();
            let password = parts.next().unwrap_or_default().to_string();
            Command::Event(Event::Login { user, password })
        }
        "list" | "ls" => Command::List(rest.to_string()),
        "select" | "open" => {
            if rest.is_empty() {
                return Err("select needs a truck key or id".to_string());
            }
            Command::Event(Event::Select(rest.to_string()))
        }
        "back" => Command::Event(Event::Back),
        "live" => Command::Event(Event::ToggleLive),
        "reset" => Command::Event(Event::Reset),
        "show" => Command::Show,
        "metrics" => Command::Metrics,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "" => return Err(String::new()),
        other => return Err(format!("unknown command {:?}, try `help`", other)),
    };

    Ok(command)
}
