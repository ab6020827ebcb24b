//! Small helpers shared by the backend

/// Compare two sequences element-wise by a derived key.
///
/// Sequences of different length are never equal.
pub fn eq_by_key<T, K, F>(left: &[T], right: &[T], key: F) -> bool
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    left.len() == right.len() && left.iter().zip(right).all(|(l, r)| key(l) == key(r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_by_key() {
        let a = [(1, "one"), (2, "two")];
        let b = [(1, "uno"), (2, "dos")];
        assert!(eq_by_key(&a, &b, |x| x.0));
        assert!(!eq_by_key(&a, &b, |x| x.1));
        assert!(!eq_by_key(&a, &b[..1], |x| x.0));
        assert!(eq_by_key::<(i32, &str), i32, _>(&[], &[], |x| x.0));
    }
}
