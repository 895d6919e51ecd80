// math.rs — minimal vector math used by the spatializer

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn vector_length(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Normalizes `v` in place and returns its original length.
/// A zero vector is left untouched and reports length 0.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_returns_length_and_unit_vector() {
        let mut v = [3.0, 4.0, 0.0];
        let len = vector_normalize(&mut v);
        assert_eq!(len, 5.0);
        assert!((vector_length(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_is_noop() {
        let mut v = VEC3_ORIGIN;
        assert_eq!(vector_normalize(&mut v), 0.0);
        assert_eq!(v, VEC3_ORIGIN);
    }
}
