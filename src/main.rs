fn main() -> Result<(), Box<dyn std::error::Error>> {
    galaxy_chat::cli::main()
}
