use assert_cmd::Command;

pub fn faqdaemon_bin() -> Command {
    #[allow(deprecated)]
    {
        Command::cargo_bin("faqdaemon").expect("faqdaemon test binary should build")
    }
}
