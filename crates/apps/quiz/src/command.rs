use clap::{Parser, Subcommand};
use game::Mode;

/// One line typed at the quiz prompt.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true, disable_help_subcommand = true, disable_version_flag = true)]
pub struct Line {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Click the map at a position
    #[command(allow_negative_numbers = true)]
    Click { lat: f64, lng: f64 },
    /// Click the country with this ISO-2 code
    Guess { iso: String },
    /// Move the pointer over a position and show the country style under it
    #[command(allow_negative_numbers = true)]
    Hover { lat: f64, lng: f64 },
    /// Zoom the map
    Zoom { level: f64 },
    /// Drag the map to a new centre
    #[command(allow_negative_numbers = true)]
    Pan { lat: f64, lng: f64 },
    /// Background the session (heavy updates are deferred)
    Background,
    /// Bring the session back to the foreground
    Foreground,
    /// Restrict the quiz to a continent ("ALL" for the world)
    Continent {
        #[arg(num_args = 1..)]
        name: Vec<String>,
    },
    /// Switch between name, flag and city prompts
    Mode { mode: Mode },
    /// Hide or show island nations
    Islands {
        #[arg(value_parser = ["hide", "show"])]
        state: String,
    },
    /// SVG path of a country outline at the current zoom
    Outline { iso: String },
    /// Countries visible in the current view
    Visible,
    Stats,
    Next,
    Reset,
    Help,
    Quit,
}

impl Line {
    pub fn parse_input(input: &str) -> Result<Command, clap::Error> {
        Line::try_parse_from(input.split_whitespace()).map(|line| line.command)
    }
}
