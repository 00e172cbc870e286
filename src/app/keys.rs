use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const BRACKETED_PASTE_START: &[u8] = b"\x1b[200~";
const BRACKETED_PASTE_END: &[u8] = b"\x1b[201~";

/// Bytes an xterm-compatible terminal would send for `key`. Keys with no
/// terminal encoding map to `None`.
pub fn key_to_bytes(key: KeyEvent) -> Option<Vec<u8>> {
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    let mut bytes = match key.code {
        KeyCode::Char(c) if ctrl => control_byte(c).map(|byte| vec![byte])?,
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            c.encode_utf8(&mut buf).as_bytes().to_vec()
        }
        KeyCode::Enter => b"\r".to_vec(),
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Tab => b"\t".to_vec(),
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        KeyCode::F(n) => function_key(n)?.to_vec(),
        _ => return None,
    };

    if alt && !matches!(key.code, KeyCode::Esc) {
        bytes.insert(0, 0x1b);
    }
    Some(bytes)
}

pub fn paste_to_bytes(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 12);
    bytes.extend_from_slice(BRACKETED_PASTE_START);
    bytes.extend_from_slice(text.replace("\r\n", "\r").replace('\n', "\r").as_bytes());
    bytes.extend_from_slice(BRACKETED_PASTE_END);
    bytes
}

fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' | 'A'..='Z' | '@' | '[' | '\\' | ']' | '^' | '_' => Some((c as u8) & 0x1f),
        ' ' | '2' => Some(0),
        '?' => Some(0x7f),
        _ => None,
    }
}

fn function_key(n: u8) -> Option<&'static [u8]> {
    let bytes: &'static [u8] = match n {
        1 => b"\x1bOP",
        2 => b"\x1bOQ",
        3 => b"\x1bOR",
        4 => b"\x1bOS",
        5 => b"\x1b[15~",
        6 => b"\x1b[17~",
        7 => b"\x1b[18~",
        8 => b"\x1b[19~",
        9 => b"\x1b[20~",
        10 => b"\x1b[21~",
        11 => b"\x1b[23~",
        12 => b"\x1b[24~",
        _ => return None,
    };
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn control_letters_map_to_c0() {
        assert_eq!(
            key_to_bytes(key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(vec![0x03])
        );
        assert_eq!(
            key_to_bytes(key(KeyCode::Char('D'), KeyModifiers::CONTROL)),
            Some(vec![0x04])
        );
        assert_eq!(key_to_bytes(key(KeyCode::Char('1'), KeyModifiers::CONTROL)), None);
    }

    #[test]
    fn navigation_keys_use_csi_sequences() {
        assert_eq!(key_to_bytes(key(KeyCode::Up, KeyModifiers::NONE)), Some(b"\x1b[A".to_vec()));
        assert_eq!(key_to_bytes(key(KeyCode::Delete, KeyModifiers::NONE)), Some(b"\x1b[3~".to_vec()));
        assert_eq!(key_to_bytes(key(KeyCode::F(5), KeyModifiers::NONE)), Some(b"\x1b[15~".to_vec()));
        assert_eq!(key_to_bytes(key(KeyCode::F(20), KeyModifiers::NONE)), None);
    }

    #[test]
    fn alt_prefixes_escape_and_text_is_utf8() {
        assert_eq!(key_to_bytes(key(KeyCode::Char('b'), KeyModifiers::ALT)), Some(b"\x1bb".to_vec()));
        assert_eq!(
            key_to_bytes(key(KeyCode::Char('é'), KeyModifiers::NONE)),
            Some("é".as_bytes().to_vec())
        );
        assert_eq!(key_to_bytes(key(KeyCode::Enter, KeyModifiers::NONE)), Some(b"\r".to_vec()));
    }

    #[test]
    fn paste_is_bracketed_with_carriage_returns() {
        assert_eq!(paste_to_bytes("a\nb"), b"\x1b[200~a\rb\x1b[201~".to_vec());
    }
}
