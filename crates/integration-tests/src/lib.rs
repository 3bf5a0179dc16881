// Intentionally empty: this crate only hosts the end-to-end tests under tests/.
