//! Tauri application library wiring the chat, chapter, and config commands.

pub mod commands;

pub fn run() {
    tauri::Builder::default()
        .invoke_handler(tauri::generate_handler![
            commands::get_config_path,
            commands::load_config,
            commands::save_config,
            commands::connect_server,
            commands::disconnect_server,
            commands::connection_status,
            commands::upload_book,
            commands::select_chapter,
            commands::ask_question,
            commands::new_chat,
            commands::conversation_log,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
