/// The three fixed queries understood by the battery's wifi dongle.
///
/// A command is sent verbatim as the whole payload of one write; there is no
/// length prefix or terminator in either direction. End of response is
/// inferred from quiescence on the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RealInfo,
    BasicInfo,
    SetInfo,
}

impl Command {
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Command::RealInfo => b"wifilocalMonitor:get dev real infor",
            // "basice" is how the firmware spells it
            Command::BasicInfo => b"wifilocalMonitor:get dev basice infor",
            Command::SetInfo => b"wifilocalMonitor:get dev set infor",
        }
    }

    /// Short label used in errors, stats and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Command::RealInfo => "real-info",
            Command::BasicInfo => "basic-info",
            Command::SetInfo => "set-info",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_plain_ascii() {
        for command in [Command::RealInfo, Command::BasicInfo, Command::SetInfo] {
            assert!(command.bytes().is_ascii());
            assert!(command.bytes().starts_with(b"wifilocalMonitor:"));
        }
    }
}
