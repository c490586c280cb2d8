use chrono::{Datelike, Local, NaiveDate};
use log::error;
use std::collections::HashMap;
use std::error::Error;
use teloxide::{
    prelude::*,
    types::{
        CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton,
        KeyboardMarkup, Message, MessageId, ReplyMarkup,
    },
};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

use crate::db::Db;
use crate::models::{Cliente, EstadoReserva, NuevaReserva, NuevoCliente, Propiedad};

// Sesión de un chat: la pantalla actual y el estado de los formularios.
pub struct UserSession {
    step: UserStep,
    // Formulario de propiedad
    prop_nombre: String,
    prop_precio: f64,
    // Formulario de cliente
    cliente_nombre: String,
    cliente_apellido: String,
    cliente_dni: String,
    cliente_telefono: Option<String>,
    cliente_email: Option<String>,
    // Datos maestros cargados al entrar al formulario de reserva
    propiedades: Vec<Propiedad>,
    clientes: Vec<Cliente>,
    // Selección y campos de la reserva
    selected_propiedad: Option<Propiedad>,
    selected_cliente: Option<Cliente>,
    check_in: Option<Date>,
    noches: String,
    precio_total: f64,
}

impl UserSession {
    fn new() -> Self {
        UserSession {
            step: UserStep::MainMenu,
            prop_nombre: String::new(),
            prop_precio: 0.0,
            cliente_nombre: String::new(),
            cliente_apellido: String::new(),
            cliente_dni: String::new(),
            cliente_telefono: None,
            cliente_email: None,
            propiedades: Vec::new(),
            clientes: Vec::new(),
            selected_propiedad: None,
            selected_cliente: None,
            check_in: None,
            noches: String::new(),
            precio_total: 0.0,
        }
    }

    fn reset_reserva(&mut self) {
        self.propiedades = Vec::new();
        self.clientes = Vec::new();
        self.selected_propiedad = None;
        self.selected_cliente = None;
        self.check_in = None;
        self.noches = String::new();
        self.precio_total = 0.0;
    }
}

// Pantallas y pasos de los formularios
#[derive(Debug, Clone, Copy, PartialEq)]
enum UserStep {
    MainMenu,
    // Alta de propiedad
    PropiedadNombre,
    PropiedadPrecio,
    PropiedadDescripcion,
    // Alta de cliente
    ClienteNombre,
    ClienteApellido,
    ClienteDni,
    ClienteTelefono,
    ClienteEmail,
    ClienteOrigen,
    // Alta de reserva
    ReservaPropiedad,
    ReservaCliente,
    ReservaCheckIn,
    ReservaNoches,
    ReservaConfirmacion,
}

pub async fn handle_message(
    msg: Message,
    bot: Bot,
    db: Db,
    user_sessions: &mut HashMap<i64, UserSession>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let chat_id = msg.chat.id;
    let text = match msg.text() {
        Some(t) => t.trim(),
        None => return Ok(()),
    };

    let session = user_sessions.entry(chat_id.0).or_insert_with(UserSession::new);

    // Los botones del menú cortan cualquier formulario a medias.
    match text {
        "/start" => {
            session.step = UserStep::MainMenu;
            bot.send_message(
                chat_id,
                "Hola! Soy el bot de gestión de alquileres. ¿Qué querés ver?",
            )
            .reply_markup(menu_principal())
            .await?;
            return Ok(());
        }
        "🏠 Propiedades" => {
            session.step = UserStep::MainMenu;
            mostrar_propiedades(&bot, chat_id, &db).await?;
            return Ok(());
        }
        "👥 Clientes" => {
            session.step = UserStep::MainMenu;
            mostrar_clientes(&bot, chat_id, &db).await?;
            return Ok(());
        }
        "📋 Reservas" => {
            session.step = UserStep::MainMenu;
            mostrar_reservas(&bot, chat_id, &db, 0, None).await?;
            return Ok(());
        }
        _ => {}
    }

    match session.step {
        UserStep::MainMenu => {
            bot.send_message(chat_id, "Elegí una opción del menú 👇")
                .reply_markup(menu_principal())
                .await?;
        }

        // ---- Alta de propiedad ----
        UserStep::PropiedadNombre => {
            session.prop_nombre = text.to_string();
            session.step = UserStep::PropiedadPrecio;
            bot.send_message(chat_id, "Precio por noche (ARS) *\n\nEj. 1500")
                .await?;
        }
        UserStep::PropiedadPrecio => match text.parse::<f64>() {
            Ok(precio) if precio >= 0.0 => {
                session.prop_precio = precio;
                session.step = UserStep::PropiedadDescripcion;
                bot.send_message(chat_id, "Descripción (enviá \"-\" para omitir):")
                    .await?;
            }
            _ => {
                bot.send_message(chat_id, "El precio debe ser un número. Intentá de nuevo:")
                    .await?;
            }
        },
        UserStep::PropiedadDescripcion => {
            let descripcion = opcional(text);
            let resultado = db
                .crear_propiedad(&session.prop_nombre, session.prop_precio, descripcion.as_deref())
                .await;
            session.step = UserStep::MainMenu;
            match resultado {
                Ok(()) => {
                    bot.send_message(chat_id, "¡Listo! Propiedad publicada correctamente 🏠")
                        .reply_markup(menu_principal())
                        .await?;
                }
                Err(e) => {
                    bot.send_message(chat_id, format!("Error al guardar: {}", e))
                        .reply_markup(menu_principal())
                        .await?;
                }
            }
        }

        // ---- Alta de cliente ----
        UserStep::ClienteNombre => {
            session.cliente_nombre = text.to_string();
            session.step = UserStep::ClienteApellido;
            bot.send_message(chat_id, "Apellido *\n\nEj. Pérez").await?;
        }
        UserStep::ClienteApellido => {
            session.cliente_apellido = text.to_string();
            session.step = UserStep::ClienteDni;
            bot.send_message(chat_id, "DNI o Pasaporte *\n\nEj. 12345678")
                .await?;
        }
        UserStep::ClienteDni => {
            session.cliente_dni = text.to_string();
            session.step = UserStep::ClienteTelefono;
            bot.send_message(chat_id, "Teléfono (enviá \"-\" para omitir):")
                .await?;
        }
        UserStep::ClienteTelefono => {
            session.cliente_telefono = opcional(text);
            session.step = UserStep::ClienteEmail;
            bot.send_message(chat_id, "Email (enviá \"-\" para omitir):")
                .await?;
        }
        UserStep::ClienteEmail => {
            session.cliente_email = opcional(text);
            session.step = UserStep::ClienteOrigen;
            bot.send_message(chat_id, "Lugar de origen (enviá \"-\" para omitir):")
                .await?;
        }
        UserStep::ClienteOrigen => {
            let nuevo = NuevoCliente {
                nombre: session.cliente_nombre.clone(),
                apellido: session.cliente_apellido.clone(),
                dni_pasaporte: session.cliente_dni.clone(),
                telefono: session.cliente_telefono.take(),
                email: session.cliente_email.take(),
                lugar_origen: opcional(text),
            };
            session.step = UserStep::MainMenu;

            if nuevo.nombre.is_empty() || nuevo.apellido.is_empty() || nuevo.dni_pasaporte.is_empty() {
                bot.send_message(chat_id, "Faltan datos: Nombre, Apellido y DNI son obligatorios.")
                    .reply_markup(menu_principal())
                    .await?;
                return Ok(());
            }

            match db.crear_cliente(&nuevo).await {
                Ok(()) => {
                    bot.send_message(chat_id, "✅ Cliente registrado correctamente")
                        .reply_markup(menu_principal())
                        .await?;
                }
                Err(e) => {
                    bot.send_message(chat_id, format!("Error: {}", e))
                        .reply_markup(menu_principal())
                        .await?;
                }
            }
        }

        // ---- Alta de reserva ----
        UserStep::ReservaPropiedad | UserStep::ReservaCliente => {
            bot.send_message(chat_id, "Elegí una opción de la lista 👇").await?;
        }
        UserStep::ReservaCheckIn => {
            // Además del calendario se acepta la fecha tipeada.
            let formato = format_description!("[year]-[month]-[day]");
            match Date::parse(text, &formato) {
                Ok(fecha) if fecha >= hoy() => {
                    session.check_in = Some(fecha);
                    session.step = UserStep::ReservaNoches;
                    bot.send_message(chat_id, "Cantidad de Noches *\n\nEj. 3").await?;
                }
                Ok(_) => {
                    bot.send_message(
                        chat_id,
                        "La fecha de entrada no puede estar en el pasado. Elegí otra fecha.",
                    )
                    .await?;
                }
                Err(_) => {
                    bot.send_message(
                        chat_id,
                        "Fecha inválida. Usá el formato YYYY-MM-DD (ej. 2024-01-01) o el calendario.",
                    )
                    .await?;
                }
            }
        }
        UserStep::ReservaNoches => match text.parse::<u32>() {
            Ok(n) if n > 0 => {
                session.noches = text.to_string();
                // El total se recalcula después de cada cambio relevante.
                session.precio_total =
                    precio_total(session.selected_propiedad.as_ref(), &session.noches);
                session.step = UserStep::ReservaConfirmacion;
                mostrar_resumen_reserva(&bot, chat_id, session).await?;
            }
            Ok(_) => {
                bot.send_message(chat_id, "La cantidad de noches debe ser mayor a 0. Intentá de nuevo:")
                    .await?;
            }
            Err(_) => {
                bot.send_message(
                    chat_id,
                    "La cantidad de noches debe ser un número entero. Intentá de nuevo:",
                )
                .await?;
            }
        },
        UserStep::ReservaConfirmacion => {
            bot.send_message(chat_id, "Usá los botones para confirmar o descartar 👇")
                .await?;
        }
    }
    Ok(())
}

pub async fn handle_callback_query(
    q: CallbackQuery,
    bot: Bot,
    msg: Message,
    db: Db,
    user_sessions: &mut HashMap<i64, UserSession>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let chat_id = msg.chat.id;
    let session = user_sessions.entry(chat_id.0).or_insert_with(UserSession::new);

    if let Some(data) = q.data.clone() {
        match data.as_str() {
            "nueva_propiedad" => {
                session.step = UserStep::PropiedadNombre;
                bot.send_message(chat_id, "Nombre de la Propiedad *\n\nEj. Cabaña frente al lago")
                    .await?;
            }
            "nuevo_cliente" => {
                session.step = UserStep::ClienteNombre;
                bot.send_message(chat_id, "Nombre *\n\nEj. Juan").await?;
            }
            "nueva_reserva" => {
                iniciar_reserva(&bot, chat_id, &db, session).await?;
            }
            _ if data.starts_with("reserva_propiedad:") => {
                // Selección desde la lista cacheada al entrar a la pantalla
                if let Some(id) = data.split(':').nth(1).and_then(|s| s.parse::<i32>().ok()) {
                    if let Some(p) = session.propiedades.iter().find(|p| p.id == id).cloned() {
                        session.selected_propiedad = Some(p);
                        session.precio_total =
                            precio_total(session.selected_propiedad.as_ref(), &session.noches);
                        session.step = UserStep::ReservaCliente;
                        mostrar_picker_clientes(&bot, chat_id, &msg, session).await?;
                    }
                }
            }
            _ if data.starts_with("reserva_cliente:") => {
                if let Some(id) = data.split(':').nth(1).and_then(|s| s.parse::<i32>().ok()) {
                    if let Some(c) = session.clientes.iter().find(|c| c.id == id).cloned() {
                        session.selected_cliente = Some(c);
                        session.step = UserStep::ReservaCheckIn;

                        let hoy = Local::now().date_naive();
                        bot.edit_message_text(
                            chat_id,
                            msg.id,
                            "Fecha de Entrada *\n\nElegila en el calendario o escribila como YYYY-MM-DD:",
                        )
                        .reply_markup(generar_calendario(hoy.month(), hoy.year()))
                        .await?;
                    }
                }
            }
            _ if data.starts_with("calendario:") => {
                let partes: Vec<&str> = data.split(':').collect();
                match partes.as_slice() {
                    ["calendario", "elegir", fecha] => {
                        let formato = format_description!("[year]-[month]-[day]");
                        if let Ok(fecha) = Date::parse(fecha, &formato) {
                            if fecha < hoy() {
                                bot.send_message(
                                    chat_id,
                                    "No se puede elegir una fecha en el pasado. Elegí otra fecha.",
                                )
                                .await?;
                            } else if session.step == UserStep::ReservaCheckIn {
                                session.check_in = Some(fecha);
                                session.step = UserStep::ReservaNoches;
                                bot.edit_message_text(
                                    chat_id,
                                    msg.id,
                                    format!("Fecha de Entrada: {}", formato_iso(fecha)),
                                )
                                .await?;
                                bot.send_message(chat_id, "Cantidad de Noches *\n\nEj. 3").await?;
                            }
                        }
                    }
                    ["calendario", "mes_sig", mes, anio] => {
                        if let (Ok(mut mes), Ok(mut anio)) = (mes.parse::<u32>(), anio.parse::<i32>()) {
                            if mes == 12 {
                                mes = 1;
                                anio += 1;
                            } else {
                                mes += 1;
                            }
                            bot.edit_message_reply_markup(chat_id, msg.id)
                                .reply_markup(generar_calendario(mes, anio))
                                .await?;
                        }
                    }
                    ["calendario", "mes_ant", mes, anio] => {
                        if let (Ok(mut mes), Ok(mut anio)) = (mes.parse::<u32>(), anio.parse::<i32>()) {
                            if mes == 1 {
                                mes = 12;
                                anio -= 1;
                            } else {
                                mes -= 1;
                            }
                            bot.edit_message_reply_markup(chat_id, msg.id)
                                .reply_markup(generar_calendario(mes, anio))
                                .await?;
                        }
                    }
                    _ => {}
                }
            }
            _ if data.starts_with("reserva_confirmar:") => {
                let respuesta = data.split(':').nth(1).unwrap_or("");
                if respuesta == "si" {
                    confirmar_reserva(&bot, chat_id, &msg, &db, session).await?;
                } else {
                    session.reset_reserva();
                    session.step = UserStep::MainMenu;
                    bot.edit_message_text(chat_id, msg.id, "Reserva descartada.").await?;
                }
            }
            _ if data.starts_with("reservas_pagina:") => {
                if let Some(pagina) = data.split(':').nth(1).and_then(|s| s.parse::<usize>().ok()) {
                    mostrar_reservas(&bot, chat_id, &db, pagina, Some(msg.id)).await?;
                }
            }
            _ => {}
        }
        bot.answer_callback_query(q.id).await?;
    }
    Ok(())
}

fn menu_principal() -> ReplyMarkup {
    let botones: Vec<Vec<KeyboardButton>> = vec![
        vec![KeyboardButton::new("🏠 Propiedades")],
        vec![KeyboardButton::new("👥 Clientes")],
        vec![KeyboardButton::new("📋 Reservas")],
    ];
    ReplyMarkup::Keyboard(KeyboardMarkup::new(botones).resize_keyboard())
}

// ---- Pantallas de listado ----

async fn mostrar_propiedades(
    bot: &Bot,
    chat_id: ChatId,
    db: &Db,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    // Una carga fallida deja la lista vacía, igual que "sin registros".
    let propiedades = db.listar_propiedades().await.unwrap_or_else(|e| {
        error!("Error cargando propiedades: {}", e);
        Vec::new()
    });

    let boton_nueva = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "➕ Nueva propiedad",
        "nueva_propiedad",
    )]]);

    if propiedades.is_empty() {
        bot.send_message(chat_id, "No hay propiedades registradas.")
            .reply_markup(ReplyMarkup::InlineKeyboard(boton_nueva))
            .await?;
        return Ok(());
    }

    let mut mensaje = String::from("🏠 *Propiedades*\n\n");
    for p in &propiedades {
        mensaje.push_str(&format!("*{}* — ${}/noche\n", p.nombre, p.precio_por_noche));
        if let Some(descripcion) = &p.descripcion {
            if !descripcion.is_empty() {
                mensaje.push_str(descripcion);
                mensaje.push('\n');
            }
        }
        mensaje.push('\n');
    }

    bot.send_message(chat_id, mensaje)
        .parse_mode(teloxide::types::ParseMode::Markdown)
        .reply_markup(ReplyMarkup::InlineKeyboard(boton_nueva))
        .await?;
    Ok(())
}

async fn mostrar_clientes(
    bot: &Bot,
    chat_id: ChatId,
    db: &Db,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let clientes = db.listar_clientes().await.unwrap_or_else(|e| {
        error!("Error cargando clientes: {}", e);
        Vec::new()
    });

    let boton_nuevo = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "➕ Nuevo cliente",
        "nuevo_cliente",
    )]]);

    if clientes.is_empty() {
        bot.send_message(chat_id, "No hay clientes registrados.")
            .reply_markup(ReplyMarkup::InlineKeyboard(boton_nuevo))
            .await?;
        return Ok(());
    }

    let mut mensaje = String::from("👥 *Clientes*\n\n");
    for c in &clientes {
        mensaje.push_str(&format!("👤 *{} {}*\n", c.nombre, c.apellido));
        mensaje.push_str(&format!(
            "📍 {}\n",
            c.lugar_origen.as_deref().unwrap_or("Sin ubicación")
        ));
        mensaje.push_str(&format!(
            "📞 {}\n\n",
            c.telefono.as_deref().unwrap_or("Sin teléfono")
        ));
    }

    bot.send_message(chat_id, mensaje)
        .parse_mode(teloxide::types::ParseMode::Markdown)
        .reply_markup(ReplyMarkup::InlineKeyboard(boton_nuevo))
        .await?;
    Ok(())
}

async fn mostrar_reservas(
    bot: &Bot,
    chat_id: ChatId,
    db: &Db,
    pagina: usize,
    editar: Option<MessageId>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let reservas = db.listar_reservas().await.unwrap_or_else(|e| {
        error!("Error cargando reservas: {}", e);
        Vec::new()
    });

    let boton_nueva = vec![InlineKeyboardButton::callback("➕ Nueva reserva", "nueva_reserva")];

    if reservas.is_empty() {
        bot.send_message(chat_id, "No hay reservas registradas.")
            .reply_markup(ReplyMarkup::InlineKeyboard(InlineKeyboardMarkup::new(vec![
                boton_nueva,
            ])))
            .await?;
        return Ok(());
    }

    let reservas_por_pagina = 3;
    let total_paginas = (reservas.len() + reservas_por_pagina - 1) / reservas_por_pagina;
    let pagina = pagina.min(total_paginas - 1);

    let desde = pagina * reservas_por_pagina;
    let hasta = std::cmp::min(desde + reservas_por_pagina, reservas.len());
    let pagina_reservas = &reservas[desde..hasta];

    let mut mensaje = String::from("📋 *Reservas*\n\n");
    for r in pagina_reservas {
        let propiedad = r.propiedad_nombre.as_deref().unwrap_or("Propiedad desconocida");
        let cliente = match (&r.cliente_nombre, &r.cliente_apellido) {
            (Some(nombre), Some(apellido)) => format!("{} {}", nombre, apellido),
            _ => "Cliente desconocido".to_string(),
        };
        let estado = match EstadoReserva::parse(&r.estado) {
            Some(e) => e.etiqueta(),
            None => r.estado.as_str(),
        };

        mensaje.push_str(&format!(
            "*{}* — {}\n👤 {}\n📅 Entrada: {}  🌙 {} noches\nTotal: ${}\n\n",
            propiedad,
            estado,
            cliente,
            formato_iso(r.check_in),
            r.cantidad_noches,
            r.precio_total
        ));
    }

    let mut keyboard = vec![boton_nueva];
    if reservas.len() > reservas_por_pagina {
        let mut nav = vec![];
        if pagina > 0 {
            nav.push(InlineKeyboardButton::callback(
                "⬅️ Anterior",
                format!("reservas_pagina:{}", pagina - 1),
            ));
        }
        nav.push(InlineKeyboardButton::callback(
            format!("📄 {}/{}", pagina + 1, total_paginas),
            "ignorar".to_string(),
        ));
        if pagina < total_paginas - 1 {
            nav.push(InlineKeyboardButton::callback(
                "Siguiente ➡️",
                format!("reservas_pagina:{}", pagina + 1),
            ));
        }
        keyboard.push(nav);
    }
    let keyboard = InlineKeyboardMarkup::new(keyboard);

    match editar {
        Some(message_id) => {
            bot.edit_message_text(chat_id, message_id, mensaje)
                .parse_mode(teloxide::types::ParseMode::Markdown)
                .reply_markup(keyboard)
                .await?;
        }
        None => {
            bot.send_message(chat_id, mensaje)
                .parse_mode(teloxide::types::ParseMode::Markdown)
                .reply_markup(ReplyMarkup::InlineKeyboard(keyboard))
                .await?;
        }
    }
    Ok(())
}

// ---- Flujo de alta de reserva ----

// Carga de datos maestros al entrar a la pantalla: la lista completa de
// propiedades y la de clientes, una vez por visita. Si una carga falla
// queda la lista vacía.
async fn iniciar_reserva(
    bot: &Bot,
    chat_id: ChatId,
    db: &Db,
    session: &mut UserSession,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    session.reset_reserva();

    session.propiedades = db.listar_propiedades().await.unwrap_or_else(|e| {
        error!("Error cargando propiedades: {}", e);
        Vec::new()
    });
    session.clientes = db.listar_clientes().await.unwrap_or_else(|e| {
        error!("Error cargando clientes: {}", e);
        Vec::new()
    });

    if session.propiedades.is_empty() {
        bot.send_message(
            chat_id,
            "No hay propiedades registradas. Cargá una propiedad antes de crear la reserva.",
        )
        .await?;
        return Ok(());
    }
    if session.clientes.is_empty() {
        bot.send_message(
            chat_id,
            "No hay clientes registrados. Cargá un cliente antes de crear la reserva.",
        )
        .await?;
        return Ok(());
    }

    session.step = UserStep::ReservaPropiedad;

    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    for p in &session.propiedades {
        keyboard.push(vec![InlineKeyboardButton::callback(
            format!("{} — ${}/noche", p.nombre, p.precio_por_noche),
            format!("reserva_propiedad:{}", p.id),
        )]);
    }

    bot.send_message(chat_id, "Propiedad *\n\nElegí una propiedad:")
        .reply_markup(ReplyMarkup::InlineKeyboard(InlineKeyboardMarkup::new(keyboard)))
        .await?;
    Ok(())
}

async fn mostrar_picker_clientes(
    bot: &Bot,
    chat_id: ChatId,
    msg: &Message,
    session: &UserSession,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    for c in &session.clientes {
        keyboard.push(vec![InlineKeyboardButton::callback(
            format!(
                "{} {} (DNI: {})",
                c.nombre,
                c.apellido,
                c.dni_pasaporte.as_deref().unwrap_or("-")
            ),
            format!("reserva_cliente:{}", c.id),
        )]);
    }

    bot.edit_message_text(chat_id, msg.id, "Cliente *\n\nElegí un cliente:")
        .reply_markup(InlineKeyboardMarkup::new(keyboard))
        .await?;
    Ok(())
}

// Resumen previo a la confirmación, con la salida y el total derivados.
async fn mostrar_resumen_reserva(
    bot: &Bot,
    chat_id: ChatId,
    session: &UserSession,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let (propiedad, cliente, check_in) = match (
        &session.selected_propiedad,
        &session.selected_cliente,
        session.check_in,
    ) {
        (Some(p), Some(c), Some(f)) => (p, c, f),
        _ => return Ok(()),
    };

    let noches: i64 = session.noches.parse().unwrap_or(0);
    let check_out = fecha_salida(check_in, noches);

    let resumen = format!(
        "*Tu reserva:*\n\
        *Propiedad:* {}\n\
        *Cliente:* {} {}\n\
        *Entrada:* {}\n\
        *Salida:* {}\n\
        *Noches:* {}\n\
        *Total Estimado:* ${}",
        propiedad.nombre,
        cliente.nombre,
        cliente.apellido,
        formato_iso(check_in),
        formato_iso(check_out),
        noches,
        session.precio_total
    );

    let keyboard = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Confirmar", "reserva_confirmar:si"),
        InlineKeyboardButton::callback("❌ Cancelar", "reserva_confirmar:no"),
    ]]);

    bot.send_message(chat_id, resumen)
        .parse_mode(teloxide::types::ParseMode::Markdown)
        .reply_markup(ReplyMarkup::InlineKeyboard(keyboard))
        .await?;
    Ok(())
}

async fn confirmar_reserva(
    bot: &Bot,
    chat_id: ChatId,
    msg: &Message,
    db: &Db,
    session: &mut UserSession,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let reserva = match armar_reserva(
        session.selected_propiedad.as_ref(),
        session.selected_cliente.as_ref(),
        session.check_in,
        &session.noches,
    ) {
        Ok(r) => r,
        Err(mensaje) => {
            // Falta algún campo obligatorio: no se toca la base.
            bot.send_message(chat_id, mensaje).await?;
            return Ok(());
        }
    };

    match db.crear_reserva(&reserva).await {
        Ok(()) => {
            session.reset_reserva();
            session.step = UserStep::MainMenu;
            bot.edit_message_text(chat_id, msg.id, "✅ Éxito: Reserva creada").await?;
            bot.send_message(chat_id, "¿Qué más querés hacer?")
                .reply_markup(menu_principal())
                .await?;
        }
        Err(e) => {
            // El mensaje crudo del error; el usuario puede reintentar.
            bot.send_message(chat_id, format!("Error: {}", e)).await?;
        }
    }
    Ok(())
}

// ---- Funciones puras del formulario de reserva ----

/// Total = precio por noche × cantidad de noches. Sin propiedad elegida,
/// o con un texto que no parsea a un entero no negativo, el total es 0.
pub fn precio_total(propiedad: Option<&Propiedad>, noches: &str) -> f64 {
    match (propiedad, noches.trim().parse::<u32>()) {
        (Some(p), Ok(n)) => p.precio_por_noche * f64::from(n),
        _ => 0.0,
    }
}

/// Fecha de salida: entrada + cantidad de noches, en días de calendario.
pub fn fecha_salida(check_in: Date, noches: i64) -> Date {
    check_in + Duration::days(noches)
}

pub fn formato_iso(fecha: Date) -> String {
    let formato = format_description!("[year]-[month]-[day]");
    fecha.format(&formato).unwrap_or_else(|_| fecha.to_string())
}

/// Arma el registro a insertar. Devuelve el mensaje de validación si
/// falta alguno de los cuatro campos obligatorios; en ese caso el caller
/// no llega a la base.
pub fn armar_reserva(
    propiedad: Option<&Propiedad>,
    cliente: Option<&Cliente>,
    check_in: Option<Date>,
    noches: &str,
) -> Result<NuevaReserva, &'static str> {
    let noches_validas = noches.trim().parse::<u32>().ok().filter(|n| *n > 0);
    let (propiedad, cliente, check_in, cantidad_noches) =
        match (propiedad, cliente, check_in, noches_validas) {
            (Some(p), Some(c), Some(f), Some(n)) => (p, c, f, n),
            _ => return Err("Completa todos los campos obligatorios"),
        };

    Ok(NuevaReserva {
        propiedad_id: propiedad.id,
        cliente_id: cliente.id,
        check_in,
        check_out: fecha_salida(check_in, i64::from(cantidad_noches)),
        cantidad_noches: cantidad_noches as i32,
        precio_total: precio_total(Some(propiedad), noches),
        estado: EstadoReserva::Confirmada,
    })
}

fn hoy() -> Date {
    OffsetDateTime::now_utc().date()
}

// "-" o vacío → NULL, igual que la app mandaba null con el campo vacío.
fn opcional(text: &str) -> Option<String> {
    if text.is_empty() || text == "-" {
        None
    } else {
        Some(text.to_string())
    }
}

// ---- Calendario para elegir la fecha de entrada ----

// Teclado inline de un mes. Cada día devuelve "calendario:elegir:YYYY-MM-DD";
// los días pasados quedan inertes.
fn generar_calendario(mes: u32, anio: i32) -> InlineKeyboardMarkup {
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = Vec::new();

    // 1. Encabezado con mes y año
    keyboard.push(vec![InlineKeyboardButton::callback(
        format!("📅 {} {}", nombre_mes(mes), anio),
        "ignorar".to_string(),
    )]);

    // 2. Días de la semana
    let dias_semana = vec!["Lu", "Ma", "Mi", "Ju", "Vi", "Sá", "Do"];
    keyboard.push(
        dias_semana
            .into_iter()
            .map(|dia| InlineKeyboardButton::callback(dia.to_string(), "ignorar".to_string()))
            .collect(),
    );

    // 3. Días del mes
    if let Some(primer_dia) = NaiveDate::from_ymd_opt(anio, mes, 1) {
        let mut fila: Vec<InlineKeyboardButton> = Vec::new();
        let cantidad_dias = dias_del_mes(mes, anio);

        let corrimiento = primer_dia.weekday().num_days_from_monday() as usize;
        for _ in 0..corrimiento {
            fila.push(InlineKeyboardButton::callback(" ".to_string(), "ignorar".to_string()));
        }

        let hoy = Local::now().date_naive();
        for dia in 1..=cantidad_dias {
            if let Some(fecha) = NaiveDate::from_ymd_opt(anio, mes, dia) {
                if fecha < hoy {
                    fila.push(InlineKeyboardButton::callback(
                        format!("❌ {}", dia),
                        "ignorar".to_string(),
                    ));
                } else {
                    fila.push(InlineKeyboardButton::callback(
                        format!("{:2}", dia),
                        format!("calendario:elegir:{}", fecha),
                    ));
                }
            }

            if fila.len() == 7 {
                keyboard.push(fila.clone());
                fila.clear();
            }
        }

        if !fila.is_empty() {
            while fila.len() < 7 {
                fila.push(InlineKeyboardButton::callback(" ".to_string(), "ignorar".to_string()));
            }
            keyboard.push(fila);
        }
    }

    // 4. Paginado de meses
    keyboard.push(vec![
        InlineKeyboardButton::callback("< Mes", format!("calendario:mes_ant:{}:{}", mes, anio)),
        InlineKeyboardButton::callback("Mes >", format!("calendario:mes_sig:{}:{}", mes, anio)),
    ]);

    InlineKeyboardMarkup::new(keyboard)
}

fn nombre_mes(mes: u32) -> &'static str {
    match mes {
        1 => "Enero", 2 => "Febrero", 3 => "Marzo", 4 => "Abril",
        5 => "Mayo", 6 => "Junio", 7 => "Julio", 8 => "Agosto",
        9 => "Septiembre", 10 => "Octubre", 11 => "Noviembre", 12 => "Diciembre",
        _ => "",
    }
}

fn dias_del_mes(mes: u32, anio: i32) -> u32 {
    let (mes_sig, anio_sig) = if mes == 12 { (1, anio + 1) } else { (mes + 1, anio) };

    NaiveDate::from_ymd_opt(anio_sig, mes_sig, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn propiedad(precio: f64) -> Propiedad {
        Propiedad {
            id: 1,
            nombre: "Cabaña frente al lago".to_string(),
            descripcion: None,
            precio_por_noche: precio,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn cliente() -> Cliente {
        Cliente {
            id: 7,
            nombre: "Juan".to_string(),
            apellido: "Pérez".to_string(),
            lugar_origen: None,
            telefono: None,
            email: None,
            dni_pasaporte: Some("12345678".to_string()),
        }
    }

    #[test]
    fn total_es_precio_por_noches() {
        let p = propiedad(100.0);
        assert_eq!(precio_total(Some(&p), "3"), 300.0);
    }

    #[test]
    fn total_cero_sin_propiedad() {
        assert_eq!(precio_total(None, "5"), 0.0);
    }

    #[test]
    fn total_cero_con_noches_invalidas() {
        let p = propiedad(100.0);
        assert_eq!(precio_total(Some(&p), "abc"), 0.0);
        assert_eq!(precio_total(Some(&p), ""), 0.0);
        assert_eq!(precio_total(Some(&p), "-2"), 0.0);
    }

    #[test]
    fn total_acepta_cero_noches() {
        let p = propiedad(100.0);
        assert_eq!(precio_total(Some(&p), "0"), 0.0);
    }

    #[test]
    fn salida_es_entrada_mas_noches() {
        assert_eq!(fecha_salida(date!(2024 - 01 - 01), 3), date!(2024 - 01 - 04));
        assert_eq!(fecha_salida(date!(2024 - 01 - 01), 0), date!(2024 - 01 - 01));
        // año bisiesto
        assert_eq!(fecha_salida(date!(2024 - 02 - 28), 2), date!(2024 - 03 - 01));
    }

    #[test]
    fn salida_en_formato_iso() {
        assert_eq!(formato_iso(date!(2024 - 01 - 04)), "2024-01-04");
    }

    #[test]
    fn reserva_completa_queda_confirmada() {
        let p = propiedad(100.0);
        let c = cliente();
        let reserva = armar_reserva(Some(&p), Some(&c), Some(date!(2024 - 01 - 01)), "3")
            .expect("reserva válida");

        assert_eq!(reserva.propiedad_id, 1);
        assert_eq!(reserva.cliente_id, 7);
        assert_eq!(reserva.check_in, date!(2024 - 01 - 01));
        assert_eq!(reserva.check_out, date!(2024 - 01 - 04));
        assert_eq!(reserva.cantidad_noches, 3);
        assert_eq!(reserva.precio_total, 300.0);
        assert_eq!(reserva.estado, EstadoReserva::Confirmada);
    }

    #[test]
    fn sin_propiedad_no_se_arma_la_reserva() {
        let c = cliente();
        assert!(armar_reserva(None, Some(&c), Some(date!(2024 - 01 - 01)), "5").is_err());
    }

    #[test]
    fn sin_cliente_no_se_arma_la_reserva() {
        let p = propiedad(100.0);
        assert!(armar_reserva(Some(&p), None, Some(date!(2024 - 01 - 01)), "5").is_err());
    }

    #[test]
    fn sin_fecha_no_se_arma_la_reserva() {
        let p = propiedad(100.0);
        let c = cliente();
        assert!(armar_reserva(Some(&p), Some(&c), None, "5").is_err());
    }

    #[test]
    fn con_noches_invalidas_no_se_arma_la_reserva() {
        let p = propiedad(100.0);
        let c = cliente();
        assert!(armar_reserva(Some(&p), Some(&c), Some(date!(2024 - 01 - 01)), "").is_err());
        assert!(armar_reserva(Some(&p), Some(&c), Some(date!(2024 - 01 - 01)), "abc").is_err());
        assert!(armar_reserva(Some(&p), Some(&c), Some(date!(2024 - 01 - 01)), "0").is_err());
    }

    #[test]
    fn dias_del_mes_conoce_febrero() {
        assert_eq!(dias_del_mes(2, 2024), 29);
        assert_eq!(dias_del_mes(2, 2023), 28);
        assert_eq!(dias_del_mes(12, 2024), 31);
    }
}
