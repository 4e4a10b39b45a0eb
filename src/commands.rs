use crate::view::ScaleMode;

/// Everything the user can ask the viewer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    NextImage,
    PrevImage,
    FirstImage,
    LastImage,
    /// Clockwise degrees relative to the current rotation.
    Rotate(i32),
    ToggleFlag(u8),
    SetScaleMode(ScaleMode),
    /// Switch to the mode, or back to `Normal` if already in it.
    ToggleScaleMode(ScaleMode),
    ZoomIn,
    ZoomOut,
    TogglePresentation,
    ToggleKeywords,
    /// Label one of the keyed flags.
    EditKeyword,
    Delete,
    EditCaption,
    EditComment,
    ShowInfo,
    Quit,
}

/// A key press with the toolkit stripped off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyInput {
    Char(char),
    Space,
    Backspace,
    Enter,
    Escape,
    Tab,
    Left,
    Right,
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    Delete,
}

pub const HELP_KEYS: &str = "\
Key Bindings:
  Space / PageDown     : Next image
  Backspace / PageUp   : Previous image
  Home / End           : First / last image
  Right / r / t        : Rotate 90 clockwise
  Left / l / R / T     : Rotate 90 counter-clockwise
  Up / Down            : Rotate 180
  0-9                  : Toggle note flag 0-9
  f                    : Toggle full-screen scaling
  F                    : Toggle full size (1:1)
  x                    : Toggle fixed-size scaling
  S                    : Scale to a ratio of the screen
  N                    : Normal scaling
  + / =  and  -        : Zoom in / out
  p                    : Toggle presentation mode
  k                    : Toggle keyword mode
  K then 0-9           : Label note flag 0-9
  d / Delete           : Delete the file (asks first)
  c                    : Edit caption
  n                    : Edit comment
  i                    : Print image info
  q / Esc              : Quit
  Middle-button drag   : Move the image in presentation mode
";

/// The fixed key map.
pub fn binding(key: KeyInput) -> Option<Command> {
    use Command::*;

    let cmd = match key {
        KeyInput::Space | KeyInput::PageDown => NextImage,
        KeyInput::Backspace | KeyInput::PageUp => PrevImage,
        KeyInput::Home => FirstImage,
        KeyInput::End => LastImage,
        KeyInput::Right => Rotate(90),
        KeyInput::Left => Rotate(-90),
        KeyInput::Up | KeyInput::Down => Rotate(180),
        KeyInput::Escape => Quit,
        KeyInput::Delete => Delete,
        KeyInput::Enter | KeyInput::Tab => return None,
        KeyInput::Char(c) => match c {
            'r' | 't' => Rotate(90),
            'l' | 'R' | 'T' => Rotate(-90),
            '0'..='9' => ToggleFlag(c as u8 - b'0'),
            'f' => ToggleScaleMode(ScaleMode::FullScreen),
            'F' => ToggleScaleMode(ScaleMode::FullSize),
            'x' => ToggleScaleMode(ScaleMode::Fixed),
            'S' => SetScaleMode(ScaleMode::ScreenRatio),
            'N' => SetScaleMode(ScaleMode::Normal),
            '+' | '=' => ZoomIn,
            '-' => ZoomOut,
            'p' => TogglePresentation,
            'k' => ToggleKeywords,
            'K' => EditKeyword,
            'd' => Delete,
            'c' => EditCaption,
            'n' => EditComment,
            'i' => ShowInfo,
            'q' => Quit,
            _ => return None,
        },
    };
    Some(cmd)
}
