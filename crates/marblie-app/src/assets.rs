//! Model preloading for the runner.
//!
//! Missing or broken `.glb` files fall back to the procedural stand-ins so
//! the toy always starts.

use marblie_core::{AssetLibrary, GltfModelSource, ProceduralModelSource};

async fn with_fallback(loaded: marblie_core::Result<AssetLibrary>) -> anyhow::Result<AssetLibrary> {
    match loaded {
        Ok(library) => Ok(library),
        Err(e) => {
            tracing::warn!("[marblie] {e}; using procedural models");
            Ok(AssetLibrary::preload(&ProceduralModelSource).await?)
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn preload_native(dir: &str) -> anyhow::Result<AssetLibrary> {
    with_fallback(AssetLibrary::preload(&GltfModelSource::from_dir(dir)).await).await
}

#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(url: &str) -> anyhow::Result<Vec<u8>> {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    let js_err = |e: wasm_bindgen::JsValue| anyhow::anyhow!("{url}: {e:?}");
    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no window"))?;
    let response: web_sys::Response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(js_err)?
        .dyn_into()
        .map_err(js_err)?;
    if !response.ok() {
        anyhow::bail!("{url}: HTTP {}", response.status());
    }
    let buffer = JsFuture::from(response.array_buffer().map_err(js_err)?)
        .await
        .map_err(js_err)?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

#[cfg(target_arch = "wasm32")]
pub async fn preload_browser(base_url: &str) -> anyhow::Result<AssetLibrary> {
    use marblie_core::track::catalog::required_models;

    let mut models = Vec::new();
    for name in required_models() {
        let Some(file) = GltfModelSource::file_name(name) else {
            continue;
        };
        match fetch_bytes(&format!("{base_url}/{file}")).await {
            Ok(bytes) => models.push((name.to_string(), bytes)),
            Err(e) => tracing::warn!("[marblie] fetch failed: {e:#}"),
        }
    }
    with_fallback(AssetLibrary::preload(&GltfModelSource::from_bytes(models)).await).await
}
