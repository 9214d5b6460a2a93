//! Identificadores sintéticos derivados de forma determinista, usados
//! para sintetizar claves primarias de filas upsert (servicios systemd,
//! dispositivos SMART) sin depender de un contador externo.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a de 32 bits sobre la concatenación de sus componentes,
/// renderizado como hexadecimal de 8 caracteres. Determinista e
/// independiente de cualquier estado de proceso.
pub fn stable_hash_id(parts: &[&str]) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    for part in parts {
        for byte in part.as_bytes() {
            hash ^= *byte as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        // separador entre componentes para evitar colisiones por
        // concatenación ambigua, p.ej. ("ab","c") vs ("a","bc").
        hash ^= 0x1f;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_id_is_deterministic() {
        let a = stable_hash_id(&["sys_1", "smartd"]);
        let b = stable_hash_id(&["sys_1", "smartd"]);
        assert_eq!(a, b);
    }

    #[test]
    fn stable_hash_id_distinguishes_component_boundaries() {
        let a = stable_hash_id(&["ab", "c"]);
        let b = stable_hash_id(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn stable_hash_id_is_eight_hex_chars() {
        let id = stable_hash_id(&["sys_1", "nginx.service"]);
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
