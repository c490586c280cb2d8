use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use dotenvy::dotenv;
use std::env;

use crate::models::{Cliente, NuevaReserva, NuevoCliente, Propiedad, ReservaConDetalles};

/// Acceso a la base remota. Se pasa explícitamente a cada handler en vez
/// de vivir como un cliente global. Solo hay SELECT e INSERT: ninguna
/// operación cruza más de una tabla.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect() -> Db {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let pool = PgPoolOptions::new()
            .connect(&database_url)
            .await
            .expect("Failed to connect to DB");
        Db { pool }
    }

    pub async fn listar_propiedades(&self) -> Result<Vec<Propiedad>, sqlx::Error> {
        sqlx::query_as::<_, Propiedad>("SELECT * FROM propiedad ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
    }

    // Del más reciente creado al más viejo.
    pub async fn listar_clientes(&self) -> Result<Vec<Cliente>, sqlx::Error> {
        sqlx::query_as::<_, Cliente>("SELECT * FROM cliente ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
    }

    /// Reservas con los datos relacionados a un nivel: nombre de la
    /// propiedad y nombre/apellido del cliente. Las más recientes primero.
    pub async fn listar_reservas(&self) -> Result<Vec<ReservaConDetalles>, sqlx::Error> {
        sqlx::query_as::<_, ReservaConDetalles>(
            r#"
            SELECT r.id, r.check_in, r.check_out, r.cantidad_noches,
                   r.precio_total, r.estado,
                   p.nombre AS propiedad_nombre,
                   c.nombre AS cliente_nombre,
                   c.apellido AS cliente_apellido
            FROM reserva r
            LEFT JOIN propiedad p ON r.propiedad_id = p.id
            LEFT JOIN cliente c ON r.cliente_id = c.id
            ORDER BY r.check_in DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn crear_propiedad(
        &self,
        nombre: &str,
        precio_por_noche: f64,
        descripcion: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO propiedad (nombre, precio_por_noche, descripcion) VALUES ($1, $2, $3)",
        )
        .bind(nombre)
        .bind(precio_por_noche)
        .bind(descripcion)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn crear_cliente(&self, cliente: &NuevoCliente) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO cliente (nombre, apellido, dni_pasaporte, telefono, email, lugar_origen)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&cliente.nombre)
        .bind(&cliente.apellido)
        .bind(&cliente.dni_pasaporte)
        .bind(&cliente.telefono)
        .bind(&cliente.email)
        .bind(&cliente.lugar_origen)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn crear_reserva(&self, reserva: &NuevaReserva) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO reserva (propiedad_id, cliente_id, check_in, check_out, cantidad_noches, precio_total, estado)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(reserva.propiedad_id)
        .bind(reserva.cliente_id)
        .bind(reserva.check_in)
        .bind(reserva.check_out)
        .bind(reserva.cantidad_noches)
        .bind(reserva.precio_total)
        .bind(reserva.estado.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
