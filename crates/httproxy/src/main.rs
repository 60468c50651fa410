fn main() -> anyhow::Result<()> {
    let args = httproxy::init::cmd::init()?;
    httproxy::start::run(args.port)
}
