pub mod fixed_buffer;
