use std::{collections::HashMap, sync::Arc};

use db::Db;
use handlers::{handle_callback_query, handle_message, UserSession};
use tokio::sync::Mutex;
mod models;
mod db;
mod handlers;
use teloxide::{
    dispatching::UpdateFilterExt,
    prelude::*,
    types::CallbackQuery,
};

extern crate pretty_env_logger;
#[macro_use] extern crate log;

#[tokio::main]
async fn main() {
    pretty_env_logger::init();
    let db = Db::connect().await;
    let bot = Bot::from_env();

    let user_sessions = Arc::new(Mutex::new(HashMap::<i64, UserSession>::new()));

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let db = db.clone();
            let user_sessions = user_sessions.clone();

            move |bot: Bot, msg: Message| {
                let db = db.clone();
                let user_sessions = user_sessions.clone();

                async move {
                    let mut sessions = user_sessions.lock().await;
                    if let Err(e) = handle_message(msg, bot, db, &mut sessions).await {
                        error!("Error atendiendo el mensaje: {}", e);
                    }
                    respond(())
                }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let db = db.clone();
            let user_sessions = user_sessions.clone();

            move |q: CallbackQuery, bot: Bot| {
                let db = db.clone();
                let user_sessions = user_sessions.clone();

                async move {
                    let mut sessions = user_sessions.lock().await;
                    if let Some(message) = q.message.clone().and_then(|m| m.regular_message().cloned()) {
                        if let Err(e) = handle_callback_query(q, bot, message, db, &mut sessions).await {
                            error!("Error atendiendo el callback: {}", e);
                        }
                    }
                    respond(())
                }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
