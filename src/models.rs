use sqlx::FromRow;
use time::{Date, OffsetDateTime};

#[derive(Debug, Clone, FromRow)]
pub struct Propiedad {
    pub id: i32,
    pub nombre: String,
    pub descripcion: Option<String>,
    pub precio_por_noche: f64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Cliente {
    pub id: i32,
    pub nombre: String,
    pub apellido: String,
    pub lugar_origen: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub dni_pasaporte: Option<String>,
}

// Fila del listado de reservas con los datos relacionados ya expandidos:
// nombre de la propiedad y nombre/apellido del cliente (join a un nivel).
#[derive(Debug, FromRow)]
pub struct ReservaConDetalles {
    pub id: i32,
    pub check_in: Date,
    pub check_out: Date,
    pub cantidad_noches: i32,
    pub precio_total: f64,
    pub estado: String,
    pub propiedad_nombre: Option<String>,
    pub cliente_nombre: Option<String>,
    pub cliente_apellido: Option<String>,
}

#[derive(Debug)]
pub struct NuevoCliente {
    pub nombre: String,
    pub apellido: String,
    pub dni_pasaporte: String,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub lugar_origen: Option<String>,
}

// El id y created_at los genera la base.
#[derive(Debug)]
pub struct NuevaReserva {
    pub propiedad_id: i32,
    pub cliente_id: i32,
    pub check_in: Date,
    pub check_out: Date,
    pub cantidad_noches: i32,
    pub precio_total: f64,
    pub estado: EstadoReserva,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstadoReserva {
    Pendiente,
    Confirmada,
    Cancelada,
}

impl EstadoReserva {
    /// Valor tal como se guarda en la columna `estado`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EstadoReserva::Pendiente => "pendiente",
            EstadoReserva::Confirmada => "confirmada",
            EstadoReserva::Cancelada => "cancelada",
        }
    }

    pub fn parse(estado: &str) -> Option<EstadoReserva> {
        match estado {
            "pendiente" => Some(EstadoReserva::Pendiente),
            "confirmada" => Some(EstadoReserva::Confirmada),
            "cancelada" => Some(EstadoReserva::Cancelada),
            _ => None,
        }
    }

    pub fn etiqueta(&self) -> &'static str {
        match self {
            EstadoReserva::Pendiente => "🕓 Pendiente",
            EstadoReserva::Confirmada => "✅ Confirmada",
            EstadoReserva::Cancelada => "❌ Cancelada",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estado_ida_y_vuelta_con_la_columna() {
        assert_eq!(EstadoReserva::Confirmada.as_str(), "confirmada");
        assert_eq!(EstadoReserva::parse("pendiente"), Some(EstadoReserva::Pendiente));
        assert_eq!(EstadoReserva::parse("cancelada"), Some(EstadoReserva::Cancelada));
        assert_eq!(EstadoReserva::parse("otra cosa"), None);
    }
}
