pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};

pub const ARG_API_URL: &str = "api-url";
pub const ARG_TIMEOUT: &str = "timeout";
pub const ARG_PROFILE_PATH: &str = "profile-path";
pub const ARG_SESSION_FILE: &str = "session-file";
pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_NAME: &str = "name";
pub const ARG_METHOD: &str = "method";
pub const ARG_PATH: &str = "path";
pub const ARG_DATA: &str = "data";

pub const DEFAULT_SESSION_FILE: &str = ".adminauth-session.json";

fn email_arg() -> Arg {
    Arg::new(ARG_EMAIL)
        .short('e')
        .long("email")
        .help("Account email")
        .env("ADMINAUTH_EMAIL")
        .required(true)
}

fn password_arg() -> Arg {
    Arg::new(ARG_PASSWORD)
        .short('p')
        .long("password")
        .help("Account password")
        .env("ADMINAUTH_PASSWORD")
        .hide_env_values(true)
        .required(true)
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("adminauth")
        .about("Admin console session client")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_API_URL)
                .short('u')
                .long("api-url")
                .help("Identity service base URL, example: https://api.example.com")
                .env("ADMINAUTH_API_BASE_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_TIMEOUT)
                .short('t')
                .long("timeout")
                .help("Per-request timeout in seconds")
                .default_value("10")
                .env("ADMINAUTH_TIMEOUT_SECONDS")
                .global(true),
        )
        .arg(
            Arg::new(ARG_PROFILE_PATH)
                .long("profile-path")
                .help("Endpoint that returns the current user")
                .default_value("/v1/auth/me")
                .env("ADMINAUTH_PROFILE_PATH")
                .global(true),
        )
        .arg(
            Arg::new(ARG_SESSION_FILE)
                .short('s')
                .long("session-file")
                .help("File holding the persisted session")
                .default_value(DEFAULT_SESSION_FILE)
                .env("ADMINAUTH_SESSION_FILE")
                .global(true),
        )
        .subcommand(
            Command::new("login")
                .about("Sign in and persist the session")
                .arg(email_arg())
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account and sign in")
                .arg(
                    Arg::new(ARG_NAME)
                        .short('n')
                        .long("name")
                        .help("Display name")
                        .required(true),
                )
                .arg(email_arg())
                .arg(password_arg()),
        )
        .subcommand(Command::new("logout").about("End the session"))
        .subcommand(Command::new("whoami").about("Restore the session and print it"))
        .subcommand(Command::new("refresh").about("Exchange the refresh token for a new pair"))
        .subcommand(
            Command::new("request")
                .about("Send an authenticated request")
                .arg(
                    Arg::new(ARG_METHOD)
                        .help("HTTP method")
                        .required(true)
                        .value_parser(["GET", "POST", "PUT", "PATCH", "DELETE"])
                        .ignore_case(true),
                )
                .arg(Arg::new(ARG_PATH).help("Request path").required(true))
                .arg(
                    Arg::new(ARG_DATA)
                        .short('d')
                        .long("data")
                        .help("JSON request body")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("guard")
                .about("Print the guard decision for a view")
                .arg(Arg::new(ARG_PATH).help("View path, example: /users").required(true)),
        );

    logging::with_args(command)
}
