use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = shelter_server::Args::parse();

	shelter_server::run(args).await
}
