use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Single-line editable text. `cursor_col` counts chars, not bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TextField {
    pub text: String,
    pub cursor_col: usize,
}

impl TextField {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor_col = text.chars().count();
        Self { text, cursor_col }
    }

    /// Inserts at the cursor; line breaks and tabs become spaces.
    pub fn insert(&mut self, text: &str) {
        let flat: String = text
            .chars()
            .map(|ch| if matches!(ch, '\n' | '\r' | '\t') { ' ' } else { ch })
            .collect();
        let col = self.col();
        let at = self.byte_at(col);
        self.text.insert_str(at, &flat);
        self.cursor_col = col + flat.chars().count();
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn col(&self) -> usize {
        self.cursor_col.min(self.len())
    }

    fn byte_at(&self, col: usize) -> usize {
        self.text
            .char_indices()
            .nth(col)
            .map_or(self.text.len(), |(index, _)| index)
    }

    fn remove(&mut self, from: usize, to: usize) {
        let range = self.byte_at(from)..self.byte_at(to);
        self.text.replace_range(range, "");
        self.cursor_col = from;
    }

    /// Where Ctrl+W stops: after the previous space or `/`. A separator
    /// right before the cursor is removed on its own.
    fn word_start(&self, col: usize) -> usize {
        let chars: Vec<char> = self.text.chars().take(col).collect();
        let mut start = col;
        while start > 0 && chars[start - 1] == ' ' {
            start -= 1;
        }
        while start > 0 && !matches!(chars[start - 1], ' ' | '/') {
            start -= 1;
        }
        if start == col {
            start.saturating_sub(1)
        } else {
            start
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let col = self.col();
        match key.code {
            KeyCode::Char('u') if ctrl => self.remove(0, col),
            KeyCode::Char('w') if ctrl => self.remove(self.word_start(col), col),
            KeyCode::Char('a') if ctrl => self.cursor_col = 0,
            KeyCode::Char('e') if ctrl => self.cursor_col = self.len(),
            KeyCode::Char(_) if ctrl => {}
            KeyCode::Char(ch) => self.insert(ch.encode_utf8(&mut [0u8; 4])),
            KeyCode::Backspace if col > 0 => self.remove(col - 1, col),
            KeyCode::Delete if col < self.len() => self.remove(col, col + 1),
            KeyCode::Left => self.cursor_col = col.saturating_sub(1),
            KeyCode::Right => self.cursor_col = (col + 1).min(self.len()),
            KeyCode::Home => self.cursor_col = 0,
            KeyCode::End => self.cursor_col = self.len(),
            _ => {}
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FormField {
    WorkArea,
    Prompt,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FormIntent {
    None,
    Cancel,
    Submit {
        work_area: String,
        prompt: Option<String>,
    },
}

/// The "new session" dialog: a work area path and an optional first prompt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionForm {
    pub work_area: TextField,
    pub prompt: TextField,
    pub focus: FormField,
    pub error: Option<String>,
}

impl SessionForm {
    pub fn new(suggested_work_area: &str) -> Self {
        Self {
            work_area: TextField::from_text(suggested_work_area),
            prompt: TextField::default(),
            focus: FormField::WorkArea,
            error: None,
        }
    }

    pub fn focused_mut(&mut self) -> &mut TextField {
        match self.focus {
            FormField::WorkArea => &mut self.work_area,
            FormField::Prompt => &mut self.prompt,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> FormIntent {
        match key.code {
            KeyCode::Esc => FormIntent::Cancel,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.focus = match self.focus {
                    FormField::WorkArea => FormField::Prompt,
                    FormField::Prompt => FormField::WorkArea,
                };
                FormIntent::None
            }
            KeyCode::Enter => self.submit(),
            _ => {
                self.error = None;
                self.focused_mut().handle_key(key);
                FormIntent::None
            }
        }
    }

    pub fn paste(&mut self, text: &str) {
        self.focused_mut().insert(text);
    }

    fn submit(&mut self) -> FormIntent {
        let work_area = self.work_area.text.trim();
        if work_area.is_empty() {
            self.focus = FormField::WorkArea;
            self.error = Some("work area path is required".to_string());
            return FormIntent::None;
        }
        let prompt = self.prompt.text.trim();
        FormIntent::Submit {
            work_area: work_area.to_string(),
            prompt: (!prompt.is_empty()).then(|| prompt.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    #[test]
    fn edits_by_char_on_unicode_text() {
        let mut field = TextField::default();
        field.insert("ab");
        field.handle_key(press(KeyCode::Char('λ')));
        assert_eq!(field.text, "abλ");
        assert_eq!(field.cursor_col, 3);

        field.handle_key(press(KeyCode::Left));
        field.handle_key(press(KeyCode::Backspace));
        assert_eq!(field.text, "aλ");
        field.handle_key(press(KeyCode::Delete));
        assert_eq!(field.text, "a");
        assert_eq!(field.cursor_col, 1);
    }

    #[test]
    fn pasted_line_breaks_become_spaces() {
        let mut field = TextField::default();
        field.insert("fix\nthe\ttests");
        assert_eq!(field.text, "fix the tests");
    }

    #[test]
    fn word_delete_stops_at_path_separator() {
        let mut field = TextField::from_text("~/src/agent-wt");
        field.handle_key(ctrl('w'));
        assert_eq!(field.text, "~/src/");
        field.handle_key(ctrl('w'));
        assert_eq!(field.text, "~/src");
        field.handle_key(ctrl('w'));
        assert_eq!(field.text, "~/");

        field.handle_key(ctrl('u'));
        assert_eq!(field.text, "");
        assert_eq!(field.cursor_col, 0);
    }

    #[test]
    fn form_submits_trimmed_values() {
        let mut form = SessionForm::new("/w/repo-wt");
        form.handle_key(press(KeyCode::Tab));
        for ch in " add logging ".chars() {
            form.handle_key(press(KeyCode::Char(ch)));
        }
        assert_eq!(
            form.handle_key(press(KeyCode::Enter)),
            FormIntent::Submit {
                work_area: "/w/repo-wt".to_string(),
                prompt: Some("add logging".to_string()),
            }
        );
    }

    #[test]
    fn empty_work_area_is_rejected_in_place() {
        let mut form = SessionForm::new("");
        form.handle_key(press(KeyCode::Tab));
        assert_eq!(form.handle_key(press(KeyCode::Enter)), FormIntent::None);
        assert_eq!(form.focus, FormField::WorkArea);
        assert!(form.error.is_some());

        form.handle_key(press(KeyCode::Char('x')));
        assert!(form.error.is_none());
        assert_eq!(form.handle_key(press(KeyCode::Esc)), FormIntent::Cancel);
    }
}
