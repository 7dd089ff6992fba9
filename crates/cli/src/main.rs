use clap::Parser;
use shellmux_cli::{
	cli::Cli,
	commands,
	error::CliError,
	logging,
	output::{self, OutputFormat, ResultBuilder},
};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let name = cli.command.name();

	match commands::dispatch(cli).await {
		Ok(code) => std::process::exit(code),
		Err(err) => {
			handle_error(name, err, format);
			std::process::exit(1);
		}
	}
}

fn handle_error(name: &str, err: CliError, format: OutputFormat) {
	let cmd_error = err.to_command_error();

	// Humans always get stderr; agents also get the envelope on stdout.
	output::print_error_stderr(&cmd_error);

	if format != OutputFormat::Text {
		let result: output::CommandResult<()> = ResultBuilder::new(name).error(cmd_error).build();
		output::print_result(&result, format);
	}
}
