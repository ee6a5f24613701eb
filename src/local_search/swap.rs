//! Swap neighborhood for local search.

use super::LocalSearch;

impl LocalSearch {
    /// Exchange the positions of customers `u` and `v`.
    pub fn swap_move(&mut self, u: usize, v: usize) -> bool {
        let (ru, rv) = (self.route_of[u], self.route_of[v]);
        let (pu, pv) = (self.position_of[u], self.position_of[v]);

        if ru == rv {
            let mut route = self.routes[ru].customers.clone();
            route.swap(pu, pv);
            return self.apply_if_improving(ru, route, ru, None);
        }

        let mut new_ru = self.routes[ru].customers.clone();
        let mut new_rv = self.routes[rv].customers.clone();
        new_ru[pu] = v;
        new_rv[pv] = u;

        self.apply_if_improving(ru, new_ru, rv, Some(new_rv))
    }
}
