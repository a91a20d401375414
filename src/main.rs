fn main() -> std::process::ExitCode {
    deadline_lib::run()
}
