use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use colored::*;
use disklist_store::DiskList;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Insert a value at the front
    Push {
        #[arg(required = true, num_args = 1..)]
        value: Vec<String>,
    },
    /// Remove the oldest value
    Pop,
    /// Move a value to the front without moving its record
    Touch {
        #[arg(required = true, num_args = 1..)]
        value: Vec<String>,
    },
    /// Remove a value wherever it sits in the list
    Remove {
        #[arg(required = true, num_args = 1..)]
        value: Vec<String>,
    },
    /// Print the offset of a value
    Get {
        #[arg(required = true, num_args = 1..)]
        value: Vec<String>,
    },
    /// Print the list front to back
    Show,
    /// Write pending link changes to disk
    Flush,
    /// Rewrite the file without gaps
    Compact,
    /// Replay the sample session on an empty file
    Demo,
}

/// One line typed into the shell.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

impl ShellLine {
    /// Splits off the command word only. The rest of the line is passed as one
    /// argument so values keep their inner whitespace.
    pub fn parse_line(line: &str) -> Result<Command, clap::Error> {
        let line = line.trim();
        let args = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => vec![verb, rest.trim_start()],
            None if line.is_empty() => vec![],
            None => vec![line],
        };
        Self::try_parse_from(args).map(|l| l.command)
    }
}

impl Command {
    /// Whether the command changes the list (and should be flushed after).
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            Command::Push { .. }
                | Command::Pop
                | Command::Touch { .. }
                | Command::Remove { .. }
                | Command::Compact
                | Command::Demo
        )
    }

    pub fn execute(&self, list: &mut DiskList) -> Result<String> {
        match self {
            Command::Push { value } => {
                let offset = list.add_front(value.join(" "))?.offset();
                Ok(format!("{} {}\n{}", "allocated at".green(), offset, render(list)))
            }
            Command::Pop => {
                let data = list.remove_last()?;
                Ok(format!("{} {}\n{}", "removed".yellow(), data, render(list)))
            }
            Command::Touch { value } => {
                let offset = offset_of(list, value)?;
                list.move_to_front(offset)?;
                Ok(render(list))
            }
            Command::Remove { value } => {
                let offset = offset_of(list, value)?;
                let data = list.remove(offset)?;
                Ok(format!("{} {}\n{}", "removed".yellow(), data, render(list)))
            }
            Command::Get { value } => Ok(match list.lookup(value.join(" ").as_bytes()) {
                Some(node) => format!("{}={}", node.offset(), node.value()),
                None => "(not found)".dimmed().to_string(),
            }),
            Command::Show => Ok(render(list)),
            Command::Flush => {
                let written = list.flush()?;
                Ok(format!("flushed {} records", written))
            }
            Command::Compact => {
                list.compact()?;
                Ok(render(list))
            }
            Command::Demo => demo(list),
        }
    }
}

/// `offset=value` for each node, front to back.
pub fn render(list: &DiskList) -> String {
    if list.is_empty() {
        return "(empty)".dimmed().to_string();
    }
    list.iter()
        .map(|node| {
            format!("{}={}", node.offset(), node.value())
                .black()
                .on_bright_green()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

fn offset_of(list: &DiskList, value: &[String]) -> Result<u32> {
    let key = value.join(" ");
    list.lookup(key.as_bytes())
        .map(|node| node.offset())
        .ok_or_else(|| anyhow!("value not found: {}", key))
}

/// Allocates, frees and compacts in the order that shows zone reuse.
fn demo(list: &mut DiskList) -> Result<String> {
    if !list.is_empty() {
        bail!("demo needs an empty list file");
    }
    let mut out = Vec::new();

    list.add_front("Hello, World!")?;
    out.push(render(list));

    let second = list.add_front("Second Node")?.offset();
    out.push(render(list));

    for i in 0..3 {
        list.add_front(format!("Hello {}", i))?;
    }
    out.push(render(list));

    list.move_to_front(second)?;
    out.push(render(list));

    list.remove_last()?;
    out.push(render(list));

    // The second insert lands after the highest zone: the file is fragmented
    for i in 0..2 {
        list.add_front(format!("Bye {}", i))?;
    }
    out.push(render(list));

    list.compact()?;
    out.push(render(list));

    list.flush()?;
    Ok(out.join("\n"))
}
