fn main() -> anyhow::Result<()> {
    stresser::cli::execute()
}
