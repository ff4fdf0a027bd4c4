pub mod dialog_buttons;
