use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Screen};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    None,
    Quit,
    /// Reload the current screen
    Refresh,
    /// Resident drops waste into the selected bin
    Dispose,
    /// Resident asks for a pickup of the selected bin
    RequestPickup,
    ToggleMaintenance,
    /// Move the selected collection one step along its lifecycle
    Advance,
    ScheduleRoute,
    StartRoute,
    CompleteRoute,
}

pub(crate) fn handle_key_event(key: KeyEvent, app: &mut App) -> Action {
    use KeyCode::{BackTab, Char, Down, Enter, Left, Right, Tab, Up};

    // Global shortcuts
    if key.code == Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }
    if key.code == Char('q') && key.modifiers.is_empty() {
        return Action::Quit;
    }

    match key.code {
        Tab | Right => {
            app.switch_screen(app.screen.next());
            return Action::Refresh;
        }
        BackTab | Left => {
            app.switch_screen(app.screen.previous());
            return Action::Refresh;
        }
        Up | Char('k') => {
            app.select_previous();
            return Action::None;
        }
        Down | Char('j') => {
            app.select_next();
            return Action::None;
        }
        Char('r') => return Action::Refresh,
        _ => {}
    }

    match (app.screen, key.code) {
        (Screen::Bins | Screen::Nearby, Char('d')) => Action::Dispose,
        (Screen::Bins | Screen::Nearby, Char('p')) => Action::RequestPickup,
        (Screen::Bins | Screen::Nearby, Char('m')) => Action::ToggleMaintenance,
        (Screen::Collections, Enter) => Action::Advance,
        (Screen::Routes, Char('a')) => Action::ScheduleRoute,
        (Screen::Routes, Char('s')) => Action::StartRoute,
        (Screen::Routes, Char('c')) => Action::CompleteRoute,
        _ => Action::None,
    }
}
