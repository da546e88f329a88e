use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::middleware::MaybeSession;
use crate::models::mobil::{Mobil, MobilForm};
use crate::models::role::Role;
use crate::routes::{bad_request, internal_error, not_found};
use crate::AppState;

struct PhotoUpload {
    file_name: String,
    bytes: Bytes,
}

/// Pull the car fields plus an optional photo out of a multipart form.
async fn parse_form(mut multipart: Multipart) -> Result<(MobilForm, Option<PhotoUpload>), Response> {
    let mut fields = serde_json::Map::new();
    let mut photo = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Form tidak valid: {e}")).into_response())?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "foto" {
            let file_name = field.file_name().unwrap_or("foto.jpg").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Upload gagal: {e}")).into_response())?;
            if !bytes.is_empty() {
                photo = Some(PhotoUpload { file_name, bytes });
            }
            continue;
        }
        let text = field
            .text()
            .await
            .map_err(|e| bad_request(format!("Form tidak valid: {e}")).into_response())?;
        // Numeric columns arrive as text fields.
        let value = match name.as_str() {
            "tahun" | "harga_sewa_harian" => text
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| bad_request(format!("Nilai {name} tidak valid")).into_response())?,
            _ => Value::from(text),
        };
        fields.insert(name, value);
    }

    let form: MobilForm = serde_json::from_value(Value::Object(fields))
        .map_err(|e| bad_request(format!("Data mobil tidak lengkap: {e}")).into_response())?;
    Ok((form, photo))
}

/// Store the photo under a timestamped name and return its public URL.
async fn upload_photo(
    state: &AppState,
    id_hint: i64,
    photo: PhotoUpload,
) -> Result<String, Response> {
    let ext = photo
        .file_name
        .rsplit('.')
        .next()
        .unwrap_or("jpg")
        .to_lowercase();
    let path = format!("assets/{}_{}.{}", id_hint, Utc::now().timestamp_millis(), ext);
    let content_type = mime_guess::from_path(&photo.file_name)
        .first_or_octet_stream()
        .to_string();
    state
        .backend
        .upload_object(None, &path, photo.bytes, &content_type)
        .await
        .map_err(|e| internal_error(e).into_response())?;
    Ok(state.backend.public_url(&path))
}

/// Best effort; a missing object never fails the caller's operation.
async fn remove_photo(state: &AppState, foto_url: &str) {
    if let Some(path) = state.backend.object_path_from_public_url(foto_url) {
        if let Err(e) = state.backend.remove_object(None, &path).await {
            warn!(path, error = %e, "failed to remove stored photo");
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    session: MaybeSession,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), Response> {
    session.protect(&[Role::Admin, Role::Petugas]).await?;
    let (form, photo) = parse_form(multipart).await?;

    let foto = match photo {
        Some(photo) => Some(upload_photo(&state, Utc::now().timestamp_millis(), photo).await?),
        None => None,
    };

    let inserted: Vec<Mobil> = state
        .backend
        .table("mobil")
        .insert(&json!([{
            "nama_mobil": form.nama_mobil,
            "tipe": form.tipe,
            "merk": form.merk,
            "tahun": form.tahun,
            "harga_sewa_harian": form.harga_sewa_harian,
            "transmisi": form.transmisi,
            "kapasitas_mesin": form.kapasitas_mesin,
            "status": form.status,
            "foto": foto,
        }]))
        .await
        .map_err(|e| internal_error(e).into_response())?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Mobil berhasil ditambahkan!",
            "mobil": inserted.first(),
        })),
    ))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id_mobil): Path<i64>,
    session: MaybeSession,
    multipart: Multipart,
) -> Result<Json<Value>, Response> {
    session.protect(&[Role::Admin, Role::Petugas]).await?;
    let (form, photo) = parse_form(multipart).await?;

    let existing: Option<Mobil> = state
        .backend
        .table("mobil")
        .select("*")
        .eq("id_mobil", id_mobil)
        .fetch_optional()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    let existing = existing.ok_or_else(|| not_found("Mobil tidak ditemukan").into_response())?;

    let foto = match photo {
        Some(photo) => {
            // A replacement photo retires the old object first.
            if let Some(old) = &existing.foto {
                remove_photo(&state, old).await;
            }
            Some(upload_photo(&state, id_mobil, photo).await?)
        }
        None => existing.foto.clone(),
    };

    state
        .backend
        .table("mobil")
        .eq("id_mobil", id_mobil)
        .update(json!({
            "nama_mobil": form.nama_mobil,
            "tipe": form.tipe,
            "merk": form.merk,
            "tahun": form.tahun,
            "harga_sewa_harian": form.harga_sewa_harian,
            "transmisi": form.transmisi,
            "kapasitas_mesin": form.kapasitas_mesin,
            "status": form.status,
            "foto": foto,
        }))
        .await
        .map_err(|e| internal_error(e).into_response())?;

    Ok(Json(json!({ "message": "Mobil berhasil diupdate!" })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id_mobil): Path<i64>,
    session: MaybeSession,
) -> Result<Json<Value>, Response> {
    session.protect(&[Role::Admin, Role::Petugas]).await?;

    let existing: Option<Mobil> = state
        .backend
        .table("mobil")
        .select("*")
        .eq("id_mobil", id_mobil)
        .fetch_optional()
        .await
        .map_err(|e| internal_error(e).into_response())?;
    let existing = existing.ok_or_else(|| not_found("Mobil tidak ditemukan").into_response())?;

    if let Some(foto) = &existing.foto {
        remove_photo(&state, foto).await;
    }

    state
        .backend
        .table("mobil")
        .eq("id_mobil", id_mobil)
        .delete()
        .await
        .map_err(|e| internal_error(e).into_response())?;

    Ok(Json(json!({ "message": "Mobil berhasil dihapus!" })))
}
