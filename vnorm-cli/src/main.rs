fn main() -> anyhow::Result<()> {
  vnorm_cli::run()
}
