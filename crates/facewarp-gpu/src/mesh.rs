/// A vertex of a pass mesh.
///
/// `position` is in clip space, `uv` addresses the pass's source target (origin at the top left),
/// and `alpha` is a per-vertex weight interpreted by the pass's shader (opacity for the copy
/// shader, brightening strength for the brighten shader).
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::NoUninit)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub alpha: f32,
}

/// Indexed triangle list drawn by a pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
}

impl Mesh {
    /// Creates a mesh from vertices and a triangle list.
    ///
    /// # Panics
    ///
    /// Panics if `indices` does not describe whole triangles or refers to a missing vertex.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u16>) -> Self {
        assert_eq!(indices.len() % 3, 0, "index list must describe whole triangles");
        assert!(
            indices.iter().all(|&i| usize::from(i) < vertices.len()),
            "index out of range for {} vertices",
            vertices.len()
        );
        Self { vertices, indices }
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
