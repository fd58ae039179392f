//! Isolated execution environments: images, checkouts, and subprocess control.

pub mod cleanup;
pub mod process;
pub mod provisioner;
pub mod recipe;
pub mod runtime;

pub use cleanup::{remove_dir_robust, retrying};
pub use process::{arg_max, command_line_length, run_with_timeout, ProcessOutput};
pub use provisioner::{CheckoutRefresher, CloneCheckout, ImageCheckout, ProvisionedImage, Provisioner};
pub use recipe::{render_dockerfile, ImageLayout, ImageRef};
pub use runtime::{container_name, ContainerRuntime, DockerCli};
