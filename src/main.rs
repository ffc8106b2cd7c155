fn main() -> anyhow::Result<()> {
    vaultview::run()
}
