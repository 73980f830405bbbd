//! Shell-integration marker vocabulary and payload decoding.
//!
//! Markers are OSC sequences, `ESC ] <number> ; <payload>` terminated by
//! BEL or `ESC \`:
//!
//! | number | payload          | marker             |
//! |--------|------------------|--------------------|
//! | 133    | `A[;...]`        | `PromptStart`      |
//! | 133    | `B[;...]`        | `CommandStart`     |
//! | 133    | `C[;...]`        | `CommandExecuted`  |
//! | 133    | `D[;exit[;...]]` | `CommandEnd`       |
//! | 7      | `file://host/p`  | `WorkingDirectory` |

pub(crate) const ESC: u8 = 0x1b;
pub(crate) const BEL: u8 = 0x07;
pub(crate) const OSC_INTRODUCER: u8 = b']';
pub(crate) const ST_FINAL: u8 = b'\\';

/// Payload length limits; longer sequences are refuted and passed through.
pub(crate) const MAX_SHELL_MARKER_PAYLOAD: usize = 64;
pub(crate) const MAX_CWD_PAYLOAD: usize = 4096;

/// Which OSC family a pending sequence belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OscKind {
    /// OSC 133 shell integration.
    ShellIntegration,
    /// OSC 7 current working directory.
    WorkingDirectory,
}

impl OscKind {
    pub(crate) fn from_number(number: &[u8]) -> Option<Self> {
        match number {
            b"133" => Some(OscKind::ShellIntegration),
            b"7" => Some(OscKind::WorkingDirectory),
            _ => None,
        }
    }

    pub(crate) fn payload_limit(self) -> usize {
        match self {
            OscKind::ShellIntegration => MAX_SHELL_MARKER_PAYLOAD,
            OscKind::WorkingDirectory => MAX_CWD_PAYLOAD,
        }
    }
}

/// A recognized out-of-band marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    PromptStart,
    CommandStart,
    CommandExecuted,
    /// Command finished. `None` when the shell sent no (or an unparsable) code.
    CommandEnd { exit_code: Option<i32> },
    WorkingDirectory(String),
}

impl Marker {
    /// Wire encoding of this marker, BEL-terminated.
    pub fn encode(&self) -> Vec<u8> {
        let body = match self {
            Marker::PromptStart => "133;A".to_string(),
            Marker::CommandStart => "133;B".to_string(),
            Marker::CommandExecuted => "133;C".to_string(),
            Marker::CommandEnd { exit_code: Some(code) } => format!("133;D;{code}"),
            Marker::CommandEnd { exit_code: None } => "133;D".to_string(),
            Marker::WorkingDirectory(path) => format!("7;file://{path}"),
        };
        let mut out = Vec::with_capacity(body.len() + 3);
        out.push(ESC);
        out.push(OSC_INTRODUCER);
        out.extend_from_slice(body.as_bytes());
        out.push(BEL);
        out
    }
}

/// Decode a complete payload. `None` means "not ours", and the caller passes
/// the raw sequence through as display bytes.
pub(crate) fn decode(kind: OscKind, payload: &[u8]) -> Option<Marker> {
    match kind {
        OscKind::ShellIntegration => decode_shell_marker(payload),
        OscKind::WorkingDirectory => decode_cwd(payload).map(Marker::WorkingDirectory),
    }
}

fn decode_shell_marker(payload: &[u8]) -> Option<Marker> {
    let mut fields = payload.split(|&b| b == b';');
    let discriminator = fields.next()?;
    match discriminator {
        b"A" => Some(Marker::PromptStart),
        b"B" => Some(Marker::CommandStart),
        b"C" => Some(Marker::CommandExecuted),
        b"D" => {
            let exit_code = fields
                .next()
                .and_then(|f| std::str::from_utf8(f).ok())
                .and_then(|f| f.trim().parse::<i32>().ok());
            Some(Marker::CommandEnd { exit_code })
        }
        _ => None,
    }
}

fn decode_cwd(payload: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(payload).ok()?;
    let path = if let Some(rest) = text.strip_prefix("file://") {
        // Skip the host part; the path starts at the next '/'.
        &rest[rest.find('/')?..]
    } else if text.starts_with('/') {
        text
    } else {
        return None;
    };
    percent_decode(path)
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3])
            && let Ok(value) = u8::from_str_radix(hex, 16)
        {
            out.push(value);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).ok()
}
