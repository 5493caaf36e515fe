use clap::{arg, command, crate_name, ArgAction, ArgMatches, Command};

mod cli;

fn uri_arg() -> clap::Arg {
    arg!(-u --uri <URI>)
        .required(true)
        .help("ImageGenie server URI, for example http://localhost:3000")
}

fn room_arg() -> clap::Arg {
    arg!(-r --room <ROOM>).required(true).help("Room id")
}

fn build_cli() -> Command {
    command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(
            Command::new(cli::UPLOAD_SUBCOMMAND)
                .about(cli::UPLOAD_DESCRIPTION)
                .arg(uri_arg())
                .arg(room_arg())
                .arg(
                    arg!(-f --file <FILE>)
                        .required(true)
                        .action(ArgAction::Append)
                        .help("Photo to upload, may be repeated"),
                ),
        )
        .subcommand(
            Command::new(cli::SEARCH_SUBCOMMAND)
                .about(cli::SEARCH_DESCRIPTION)
                .arg(uri_arg())
                .arg(room_arg())
                .arg(
                    arg!(-f --file <FILE>)
                        .required(true)
                        .help("Reference photo"),
                ),
        )
        .subcommand(
            Command::new(cli::ROOMS_SUBCOMMAND)
                .about(cli::ROOMS_DESCRIPTION)
                .arg(uri_arg()),
        )
        .subcommand(
            Command::new(cli::CHECK_SUBCOMMAND)
                .about(cli::CHECK_DESCRIPTION)
                .arg(uri_arg())
                .arg(room_arg()),
        )
        .subcommand(
            Command::new(cli::DOWNLOAD_SUBCOMMAND)
                .about(cli::DOWNLOAD_DESCRIPTION)
                .arg(uri_arg())
                .arg(room_arg())
                .arg(
                    arg!(-c --cluster <CLUSTER>)
                        .required(true)
                        .help("Cluster name"),
                )
                .arg(
                    arg!(-o --output <FILE>)
                        .required(false)
                        .help("Where to save the archive, <CLUSTER>.zip by default"),
                ),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
}

async fn dispatch(cli: &ArgMatches) {
    match cli.subcommand() {
        Some((cli::VERSION_SUBCOMMAND, _)) => cli::version::run(),
        Some((cli::BUGREPORT_SUBCOMMAND, _)) => cli::bugreport::run(),
        Some((cli::SERVER_SUBCOMMAND, _)) => cli::server::run().await,
        Some((cli::UPLOAD_SUBCOMMAND, matches)) => cli::client::upload(matches).await,
        Some((cli::SEARCH_SUBCOMMAND, matches)) => cli::client::search(matches).await,
        Some((cli::ROOMS_SUBCOMMAND, matches)) => cli::client::list_rooms(matches).await,
        Some((cli::CHECK_SUBCOMMAND, matches)) => cli::client::check_room(matches).await,
        Some((cli::DOWNLOAD_SUBCOMMAND, matches)) => cli::client::download(matches).await,
        _ => {}
    }
}

#[tokio::main]
async fn main() {
    let cli = build_cli().get_matches();
    dispatch(&cli).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn upload_accepts_many_files() {
        // Act
        let matches = build_cli().get_matches_from([
            "genie", "upload", "-u", "http://localhost:3000", "-r", "R1", "-f", "a.jpg", "-f",
            "b.jpg",
        ]);

        // Assert
        let (name, upload) = matches.subcommand().unwrap();
        assert_eq!(name, cli::UPLOAD_SUBCOMMAND);
        let files: Vec<&String> = upload.get_many::<String>("file").unwrap().collect();
        assert_eq!(files, ["a.jpg", "b.jpg"]);
    }

    #[test]
    fn download_requires_cluster() {
        // Act
        let result = build_cli().try_get_matches_from([
            "genie", "download", "-u", "http://localhost:3000", "-r", "R1",
        ]);

        // Assert
        assert!(result.is_err());
    }
}
