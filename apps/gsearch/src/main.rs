use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = gsearch::Args::parse();
	gsearch::run(args).await
}
