//! Shared helper for turning a caught panic payload into a string, used by
//! both the per-delivery panic guard (spec.md §4.4) and the supervisor's
//! outer-loop guard (spec.md §4.5).

pub fn stringify_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_str_and_string_payloads() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(stringify_panic(boxed.as_ref()), "boom");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("also boom"));
        assert_eq!(stringify_panic(boxed.as_ref()), "also boom");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(42i32);
        assert_eq!(stringify_panic(boxed.as_ref()), "unknown panic payload");
    }
}
