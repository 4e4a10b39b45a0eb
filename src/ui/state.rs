use winit::keyboard::{Key, NamedKey};

use crate::commands::{binding, Command, KeyInput};
use crate::loader::ImageSource;
use crate::session::{Flow, Prompt, Session};
use crate::view::WindowAdapter;

// ---------------------------------------------------------------------------
// Key translation
// ---------------------------------------------------------------------------

/// Map a winit key onto the viewer's own key type. Case is kept.
pub fn key_input(key: &Key) -> Option<KeyInput> {
    match key {
        Key::Named(named) => Some(match named {
            NamedKey::Space => KeyInput::Space,
            NamedKey::Backspace => KeyInput::Backspace,
            NamedKey::Enter => KeyInput::Enter,
            NamedKey::Escape => KeyInput::Escape,
            NamedKey::Tab => KeyInput::Tab,
            NamedKey::ArrowLeft => KeyInput::Left,
            NamedKey::ArrowRight => KeyInput::Right,
            NamedKey::ArrowUp => KeyInput::Up,
            NamedKey::ArrowDown => KeyInput::Down,
            NamedKey::PageUp => KeyInput::PageUp,
            NamedKey::PageDown => KeyInput::PageDown,
            NamedKey::Home => KeyInput::Home,
            NamedKey::End => KeyInput::End,
            NamedKey::Delete => KeyInput::Delete,
            _ => return None,
        }),
        Key::Character(s) => s.chars().next().map(KeyInput::Char),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Input state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Caption,
    Comment,
    /// Label of a note flag.
    Keyword(u32),
}

/// What the next key press means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Browse,
    ConfirmDelete,
    ConfirmQuit,
    /// Waiting for the digit of the flag to label.
    PickKeyword,
    Edit { field: TextField, text: String },
}

#[derive(Debug)]
pub struct InputState {
    mode: InputMode,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

fn show_prompt<S: ImageSource>(session: &mut Session<S>, win: &mut dyn WindowAdapter, text: String) {
    session.set_notice(text);
    win.set_title(&session.window_title());
    win.request_redraw();
}

fn edit_prompt(field: TextField, text: &str) -> String {
    let label = match field {
        TextField::Caption => "Caption".to_string(),
        TextField::Comment => "Comment".to_string(),
        TextField::Keyword(n) => format!("Keyword {}", n),
    };
    format!("{}: {}_ (Enter to keep, Esc to cancel)", label, text)
}

impl InputState {
    pub fn new() -> Self {
        Self {
            mode: InputMode::Browse,
        }
    }

    pub fn mode(&self) -> &InputMode {
        &self.mode
    }

    pub fn is_browsing(&self) -> bool {
        self.mode == InputMode::Browse
    }

    /// Last image reached: the next "next" ends the session.
    pub fn ask_quit<S: ImageSource>(&mut self, session: &mut Session<S>, win: &mut dyn WindowAdapter) {
        self.mode = InputMode::ConfirmQuit;
        show_prompt(
            session,
            win,
            "Last image: press space again to quit".to_string(),
        );
    }

    fn clear_prompt<S: ImageSource>(&mut self, session: &mut Session<S>, win: &mut dyn WindowAdapter) {
        self.mode = InputMode::Browse;
        session.dismiss_notice();
        win.set_title(&session.window_title());
        win.request_redraw();
    }

    /// Handle one key press. Returns true when the session should end.
    pub fn handle<S: ImageSource>(
        &mut self,
        key: KeyInput,
        session: &mut Session<S>,
        win: &mut dyn WindowAdapter,
    ) -> bool {
        match std::mem::replace(&mut self.mode, InputMode::Browse) {
            InputMode::Browse => self.browse(key, session, win),

            InputMode::ConfirmQuit => {
                self.clear_prompt(session, win);
                matches!(
                    (key, binding(key)),
                    (KeyInput::Char('y') | KeyInput::Enter, _)
                        | (_, Some(Command::NextImage | Command::Quit))
                )
            }

            InputMode::ConfirmDelete => {
                self.clear_prompt(session, win);
                if key != KeyInput::Char('y') {
                    log::debug!("Delete cancelled");
                    return false;
                }
                self.follow(session.confirm_delete(win), session, win)
            }

            InputMode::PickKeyword => match key {
                KeyInput::Char(c @ '0'..='9') => {
                    let note = c as u32 - '0' as u32;
                    let text = session.keyword(note).to_string();
                    show_prompt(session, win, edit_prompt(TextField::Keyword(note), &text));
                    self.mode = InputMode::Edit {
                        field: TextField::Keyword(note),
                        text,
                    };
                    false
                }
                _ => {
                    self.clear_prompt(session, win);
                    false
                }
            },

            InputMode::Edit { field, mut text } => {
                match key {
                    KeyInput::Enter => {
                        match field {
                            TextField::Caption => session.set_caption(&text),
                            TextField::Comment => session.set_comment(&text),
                            TextField::Keyword(n) => session.set_keyword(n, &text),
                        }
                        self.clear_prompt(session, win);
                        return false;
                    }
                    KeyInput::Escape => {
                        self.clear_prompt(session, win);
                        return false;
                    }
                    KeyInput::Backspace => {
                        text.pop();
                    }
                    KeyInput::Space => text.push(' '),
                    KeyInput::Char(c) => text.push(c),
                    _ => {}
                }
                show_prompt(session, win, edit_prompt(field, &text));
                self.mode = InputMode::Edit { field, text };
                false
            }
        }
    }

    fn browse<S: ImageSource>(
        &mut self,
        key: KeyInput,
        session: &mut Session<S>,
        win: &mut dyn WindowAdapter,
    ) -> bool {
        if session.dismiss_notice() {
            win.set_title(&session.window_title());
            win.request_redraw();
        }
        let Some(cmd) = binding(key) else {
            return false;
        };
        log::debug!("{:?} -> {:?}", key, cmd);
        let flow = session.apply(cmd, win);
        self.follow(flow, session, win)
    }

    /// Act on what a command asked for.
    pub fn follow<S: ImageSource>(
        &mut self,
        flow: Flow,
        session: &mut Session<S>,
        win: &mut dyn WindowAdapter,
    ) -> bool {
        match flow {
            Flow::Continue => false,
            Flow::Quit => true,
            Flow::AtEnd => {
                self.ask_quit(session, win);
                false
            }
            Flow::Prompt(Prompt::ConfirmDelete(path)) => {
                self.mode = InputMode::ConfirmDelete;
                show_prompt(session, win, format!("Delete {}? (y/n)", path.display()));
                false
            }
            Flow::Prompt(Prompt::Caption(text)) => {
                show_prompt(session, win, edit_prompt(TextField::Caption, &text));
                self.mode = InputMode::Edit {
                    field: TextField::Caption,
                    text,
                };
                false
            }
            Flow::Prompt(Prompt::Comment(text)) => {
                show_prompt(session, win, edit_prompt(TextField::Comment, &text));
                self.mode = InputMode::Edit {
                    field: TextField::Comment,
                    text,
                };
                false
            }
            Flow::Prompt(Prompt::PickKeyword) => {
                self.mode = InputMode::PickKeyword;
                show_prompt(session, win, "Label which flag? (0-9)".to_string());
                false
            }
        }
    }
}
