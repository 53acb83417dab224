//! Inline keyboards shown to users.

use attendance_core::Account;

use crate::commands::Action;
use crate::gateway::Keyboard;

/// Per-account menu. The first button reflects whether a monitor is live;
/// the mode button offers the other mode.
pub fn main_menu(account: &Account, active: bool, admin: bool) -> Keyboard {
    let kb = if active {
        Keyboard::new().button("Stop Monitoring", Action::Stop.callback_data())
    } else {
        Keyboard::new().button("Start Monitoring", Action::Start.callback_data())
    };
    let kb = kb
        .button(
            format!("Switch to {}", account.mode.toggled().label()),
            Action::SwitchMode.callback_data(),
        )
        .button("Status", Action::Status.callback_data());
    if admin {
        kb.button("Admin Panel", Action::AdminPanel.callback_data())
    } else {
        kb
    }
}

pub fn admin_menu() -> Keyboard {
    Keyboard::new()
        .button("Generate Invitation Code", Action::AdminGenerate.callback_data())
        .button("View All Students", Action::AdminStudents.callback_data())
        .button("View Active Monitors", Action::AdminActive.callback_data())
}

/// Shown to users who have not registered yet.
pub fn welcome_menu(admin: bool) -> Keyboard {
    let kb = Keyboard::new().button("Enter Invitation Code", Action::EnterCode.callback_data());
    if admin {
        kb.button("Admin Panel", Action::AdminPanel.callback_data())
    } else {
        kb
    }
}

/// Single "Mark Now" button attached to a manual-mode detection.
pub fn mark_now_keyboard() -> Keyboard {
    Keyboard::new().button("Mark Now", Action::MarkNow.callback_data())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendance_core::Mode;

    fn account(mode: Mode) -> Account {
        let mut a = Account::new(1, "u1", "pw", "ABCD1234");
        a.mode = mode;
        a
    }

    #[test]
    fn test_main_menu_inactive() {
        let kb = main_menu(&account(Mode::Automatic), false, false);
        assert_eq!(kb.callbacks(), vec!["start", "switch_mode", "status"]);
        assert_eq!(kb.labels()[1], "Switch to Manual");
    }

    #[test]
    fn test_main_menu_active_admin() {
        let kb = main_menu(&account(Mode::Manual), true, true);
        assert_eq!(kb.callbacks(), vec!["stop", "switch_mode", "status", "admin_panel"]);
        assert_eq!(kb.labels()[0], "Stop Monitoring");
        assert_eq!(kb.labels()[1], "Switch to Automatic");
    }

    #[test]
    fn test_welcome_and_admin_menus() {
        assert_eq!(welcome_menu(false).callbacks(), vec!["enter_code"]);
        assert_eq!(welcome_menu(true).callbacks(), vec!["enter_code", "admin_panel"]);
        assert_eq!(
            admin_menu().callbacks(),
            vec!["admin_generate", "admin_students", "admin_active"]
        );
        assert_eq!(mark_now_keyboard().labels(), vec!["Mark Now"]);
    }
}
